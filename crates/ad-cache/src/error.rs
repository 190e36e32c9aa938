//! Error types for the ad caches
//!
//! These stay inside the crate's richer internal results; the public cache
//! surface reports plain `bool` / `Option` outcomes.

use disk_lru_cache::StoreError;
use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    /// The store could not be opened, or was never opened
    Initialization(String),
    /// Another put for the same key is still writing
    EditConflict(String),
    Io(Box<std::io::Error>),
    InvalidArgument(String),
    Store(StoreError),
    Serialization(String),
    Config(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            CacheError::EditConflict(key) => write!(f, "Edit conflict for key {}", key),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CacheError::Store(err) => write!(f, "Store error: {}", err),
            CacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EditInProgress(key) => CacheError::EditConflict(key),
            StoreError::Io(err) => CacheError::Io(err),
            StoreError::InvalidKey(key) => {
                CacheError::InvalidArgument(format!("invalid cache key {:?}", key))
            }
            other => CacheError::Store(other),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
