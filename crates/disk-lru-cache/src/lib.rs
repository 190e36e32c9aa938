//! Journaled disk cache with LRU eviction
//!
//! Stores `(key, values)` entries as plain files under a single directory,
//! with a line-oriented journal recording every edit so the cache survives
//! process restarts. Writes go through a single-writer [`Editor`] and
//! become visible atomically on commit; reads go through a [`Snapshot`]
//! holding open file handles. Entries are evicted in least-recently-used
//! order whenever a commit pushes the cache past its byte budget.

mod cache;
mod editor;
pub mod error;
mod journal;
pub mod key;
mod snapshot;
mod types;

pub use cache::{validate_key, DiskLruCache};
pub use editor::Editor;
pub use error::{Result, StoreError};
pub use key::NormalizedKey;
pub use snapshot::Snapshot;
pub use types::{CacheStats, StoreConfig};
