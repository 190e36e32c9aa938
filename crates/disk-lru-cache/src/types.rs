//! Cache types

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameters a store is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Version tag of the data written by the application. A journal
    /// written under a different tag is discarded on open.
    pub app_version: u32,
    /// Number of value slots per entry
    pub value_count: usize,
    /// Maximum total bytes across all committed values
    pub max_size: u64,
    /// Maximum number of entries, if bounded
    pub max_entries: Option<usize>,
}

impl StoreConfig {
    pub fn new(app_version: u32, value_count: usize, max_size: u64) -> Self {
        Self {
            app_version,
            value_count,
            max_size,
            max_entries: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(StoreError::InvalidConfig("max_size must be > 0".to_string()));
        }
        if self.value_count == 0 {
            return Err(StoreError::InvalidConfig(
                "value_count must be > 0".to_string(),
            ));
        }
        if self.max_entries == Some(0) {
            return Err(StoreError::InvalidConfig(
                "max_entries must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub opened_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert!(stats.opened_at.is_none());
    }

    #[test]
    fn test_cache_stats_serialization() {
        let stats = CacheStats {
            entries: 3,
            total_size: 12345,
            max_size: 1 << 20,
            hits: 7,
            misses: 2,
            opened_at: Some(Utc::now()),
        };

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("12345"));
        assert!(json.contains("opened_at"));
    }

    #[test]
    fn test_config_validation() {
        assert!(StoreConfig::new(1, 1, 1024).validate().is_ok());
        assert!(StoreConfig::new(1, 0, 1024).validate().is_err());
        assert!(StoreConfig::new(1, 1, 0).validate().is_err());
        assert!(StoreConfig::new(1, 1, 1024)
            .with_max_entries(0)
            .validate()
            .is_err());
    }
}
