//! Error types for the disk LRU cache

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Io(Box<std::io::Error>),
    InvalidKey(String),
    InvalidIndex { index: usize, value_count: usize },
    InvalidConfig(String),
    EditInProgress(String),
    EditFailed(String),
    MissingValue { key: String, index: usize },
    CorruptJournal(String),
    Closed,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "IO error: {}", err),
            StoreError::InvalidKey(key) => {
                write!(f, "Invalid key {:?}: keys must match [a-z0-9_-]{{1,120}}", key)
            }
            StoreError::InvalidIndex { index, value_count } => write!(
                f,
                "Value index {} out of range (entries hold {} values)",
                index, value_count
            ),
            StoreError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            StoreError::EditInProgress(key) => {
                write!(f, "Another edit is in progress for key {}", key)
            }
            StoreError::EditFailed(key) => write!(f, "Edit for key {} failed and was aborted", key),
            StoreError::MissingValue { key, index } => write!(
                f,
                "Newly created entry {} didn't create value for index {}",
                key, index
            ),
            StoreError::CorruptJournal(msg) => write!(f, "Corrupt journal: {}", msg),
            StoreError::Closed => write!(f, "Cache is closed"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
