//! Cache root and per-namespace configuration

use crate::error::{CacheError, Result};
use std::env;
use std::path::PathBuf;

pub const SETTINGS_NAMESPACE: &str = "settings-cache";
pub const VIDEO_NAMESPACE: &str = "video-cache";

/// Version tag written into every namespace journal
pub const DEFAULT_APP_VERSION: u32 = 1;

/// Each entry stores exactly one value
pub const VALUE_COUNT: usize = 1;

/// The value slot every cache entry uses
pub const VALUE_INDEX: usize = 0;

/// A disk-backed cache region with its own directory and budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    pub name: String,
    pub directory: PathBuf,
    pub app_version: u32,
    /// Byte budget; derived from available disk space when unset
    pub max_size: Option<u64>,
    pub max_entries: Option<usize>,
}

impl NamespaceConfig {
    /// A namespace stored in `<root>/<name>`
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let directory = root.into().join(&name);
        Self {
            name,
            directory,
            app_version: DEFAULT_APP_VERSION,
            max_size: None,
            max_entries: None,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_app_version(mut self, app_version: u32) -> Self {
        self.app_version = app_version;
        self
    }
}

/// Cache configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root_dir: PathBuf,
    pub app_version: u32,
    pub settings_max_size: Option<u64>,
    pub video_max_size: Option<u64>,
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./cache/ads"),
            app_version: DEFAULT_APP_VERSION,
            settings_max_size: None,
            video_max_size: None,
            max_entries: None,
        }
    }
}

impl CacheConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let root_dir = env::var("AD_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.root_dir);

        let app_version = env::var("AD_CACHE_APP_VERSION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.app_version);

        let settings_max_size = env::var("AD_CACHE_SETTINGS_MAX_BYTES")
            .ok()
            .and_then(|s| s.parse().ok());

        let video_max_size = env::var("AD_CACHE_VIDEO_MAX_BYTES")
            .ok()
            .and_then(|s| s.parse().ok());

        let max_entries = env::var("AD_CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok());

        Self {
            root_dir,
            app_version,
            settings_max_size,
            video_max_size,
            max_entries,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(CacheError::Config("cache directory is empty".to_string()));
        }
        if self.settings_max_size == Some(0) || self.video_max_size == Some(0) {
            return Err(CacheError::Config(
                "namespace size budget must be > 0".to_string(),
            ));
        }
        if self.max_entries == Some(0) {
            return Err(CacheError::Config("max entries must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn settings_namespace(&self) -> NamespaceConfig {
        self.namespace(SETTINGS_NAMESPACE, self.settings_max_size)
    }

    pub fn video_namespace(&self) -> NamespaceConfig {
        self.namespace(VIDEO_NAMESPACE, self.video_max_size)
    }

    fn namespace(&self, name: &str, max_size: Option<u64>) -> NamespaceConfig {
        NamespaceConfig {
            max_size,
            max_entries: self.max_entries,
            ..NamespaceConfig::new(name, &self.root_dir).with_app_version(self.app_version)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.root_dir, PathBuf::from("./cache/ads"));
        assert_eq!(config.app_version, DEFAULT_APP_VERSION);
        assert!(config.settings_max_size.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_namespaces_use_separate_directories() {
        let config = CacheConfig {
            root_dir: PathBuf::from("/data/ads"),
            video_max_size: Some(50 * 1024 * 1024),
            ..CacheConfig::default()
        };

        let settings = config.settings_namespace();
        let video = config.video_namespace();

        assert_eq!(settings.directory, PathBuf::from("/data/ads/settings-cache"));
        assert_eq!(video.directory, PathBuf::from("/data/ads/video-cache"));
        assert_ne!(settings.directory, video.directory);
        assert_eq!(settings.max_size, None);
        assert_eq!(video.max_size, Some(50 * 1024 * 1024));
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let config = CacheConfig {
            settings_max_size: Some(0),
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_namespace_builder() {
        let namespace = NamespaceConfig::new("custom", "/tmp/root")
            .with_max_size(1024)
            .with_max_entries(10)
            .with_app_version(3);

        assert_eq!(namespace.name, "custom");
        assert_eq!(namespace.max_size, Some(1024));
        assert_eq!(namespace.max_entries, Some(10));
        assert_eq!(namespace.app_version, 3);
    }
}
