//! Ad SDK disk caches
//!
//! A [`CacheService`] binds one cache namespace (a directory with its own
//! size budget) to a lazily opened [`disk_lru_cache::DiskLruCache`] and
//! offers blocking and asynchronous get/put on top of it. Failures never
//! reach the caller: puts report `false` and gets report `None`.
//!
//! [`SettingsCache`] and [`VideoCache`] are the two namespaces the SDK uses.

pub mod completion;
pub mod config;
pub mod error;
pub mod service;
pub mod settings;
pub mod space;
pub mod video;

pub use completion::{CompletionContext, CompletionTask, CompletionThread};
pub use config::{CacheConfig, NamespaceConfig, SETTINGS_NAMESPACE, VIDEO_NAMESPACE};
pub use error::{CacheError, Result};
pub use service::CacheService;
pub use settings::{AdUnitSettings, SettingsCache, DEFAULT_HASH};
pub use space::{disk_cache_size_bytes, DiskSpace, FixedDiskSpace, SystemDiskSpace};
pub use video::VideoCache;

pub use disk_lru_cache::{CacheStats, NormalizedKey};
