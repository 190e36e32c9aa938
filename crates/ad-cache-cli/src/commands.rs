//! Subcommand handlers
//!
//! Each handler opens the namespace it needs from the shared
//! [`CacheConfig`], so the CLI sees exactly what the SDK would.

use crate::error::{CliError, Result};
use ad_cache::{CacheConfig, CacheService, CacheStats, SettingsCache, VideoCache};
use clap::ValueEnum;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Namespace {
    Settings,
    Video,
}

impl Namespace {
    fn service(self, config: &CacheConfig) -> Result<CacheService> {
        let namespace = match self {
            Namespace::Settings => config.settings_namespace(),
            Namespace::Video => config.video_namespace(),
        };
        Ok(CacheService::new(namespace)?)
    }
}

fn initialized(service: CacheService) -> Result<CacheService> {
    if service.initialize() {
        Ok(service)
    } else {
        Err(CliError::Failed(format!(
            "could not open cache namespace {}",
            service.namespace().name
        )))
    }
}

pub async fn put(config: &CacheConfig, namespace: Namespace, key: &str, file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(file).await?;
    let size = bytes.len();
    let service = namespace.service(config)?;

    if !service.put(key, bytes).await {
        return Err(CliError::Failed(format!("could not store {}", key)));
    }

    info!(namespace = %service.namespace().name, key, bytes = size, "Stored value");
    Ok(())
}

pub async fn get(config: &CacheConfig, namespace: Namespace, key: &str) -> Result<Vec<u8>> {
    let service = namespace.service(config)?;
    service
        .get(key)
        .await
        .ok_or_else(|| CliError::NotFound(key.to_string()))
}

/// Stream the value under `key` into `output` without loading it whole
pub fn export(config: &CacheConfig, namespace: Namespace, key: &str, output: &Path) -> Result<u64> {
    let service = initialized(namespace.service(config)?)?;
    let mut file = std::io::BufWriter::new(std::fs::File::create(output)?);

    match service.copy_to(key, &mut file) {
        Some(copied) => {
            file.flush()?;
            Ok(copied)
        }
        None => {
            drop(file);
            std::fs::remove_file(output)?;
            Err(CliError::NotFound(key.to_string()))
        }
    }
}

/// Settings hash for an ad unit, `"0"` when none is cached
pub fn hash(config: &CacheConfig, ad_unit_id: &str) -> Result<String> {
    let cache = SettingsCache::open(config)?;
    if !cache.initialize() {
        return Err(CliError::Failed("could not open settings cache".to_string()));
    }
    Ok(cache.get_hash_sync(ad_unit_id))
}

pub fn video_path(config: &CacheConfig, key: &str) -> Result<PathBuf> {
    let cache = VideoCache::open(config)?;
    if !cache.initialize() {
        return Err(CliError::Failed("could not open video cache".to_string()));
    }
    if !cache.contains_key(key) {
        return Err(CliError::NotFound(key.to_string()));
    }
    cache
        .get_file_path(key)
        .ok_or_else(|| CliError::NotFound(key.to_string()))
}

pub fn stats(config: &CacheConfig, namespace: Namespace) -> Result<CacheStats> {
    let service = initialized(namespace.service(config)?)?;
    service
        .stats()
        .ok_or_else(|| CliError::Failed("cache namespace closed".to_string()))
}

pub fn clear(config: &CacheConfig, namespace: Namespace) -> Result<()> {
    let service = initialized(namespace.service(config)?)?;
    service.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ad_cache::{AdUnitSettings, DEFAULT_HASH};
    use tempfile::tempdir;

    fn config(root: &Path) -> CacheConfig {
        CacheConfig {
            root_dir: root.to_path_buf(),
            settings_max_size: Some(1 << 20),
            video_max_size: Some(1 << 20),
            ..CacheConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_then_get_from_file() {
        let dir = tempdir().unwrap();
        let config = config(&dir.path().join("cache"));
        let input = dir.path().join("intro.mp4");
        std::fs::write(&input, b"video bytes").unwrap();

        put(&config, Namespace::Video, "intro", &input).await.unwrap();

        let value = get(&config, Namespace::Video, "intro").await.unwrap();
        assert_eq!(value, b"video bytes");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let err = get(&config, Namespace::Settings, "nothing").await.unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        let err = put(&config, Namespace::Video, "k", &dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }

    #[test]
    fn test_export_writes_value_to_file() {
        let dir = tempdir().unwrap();
        let config = config(&dir.path().join("cache"));
        let cache = VideoCache::open(&config).unwrap();
        assert!(cache.initialize());
        assert!(cache.put("clip", b"frames"));

        let output = dir.path().join("clip.mp4");
        assert_eq!(export(&config, Namespace::Video, "clip", &output).unwrap(), 6);
        assert_eq!(std::fs::read(&output).unwrap(), b"frames");

        let missing = dir.path().join("missing.mp4");
        assert!(matches!(
            export(&config, Namespace::Video, "missing", &missing),
            Err(CliError::NotFound(_))
        ));
        assert!(!missing.exists());
    }

    #[test]
    fn test_hash_reads_settings_namespace() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let cache = SettingsCache::open(&config).unwrap();
        assert!(cache.initialize());
        assert!(cache.put_sync(
            "adUnit123",
            &AdUnitSettings::new("12345", serde_json::json!({}))
        ));

        assert_eq!(hash(&config, "adUnit123").unwrap(), "12345");
        assert_eq!(hash(&config, "unknownUnit").unwrap(), DEFAULT_HASH);
    }

    #[test]
    fn test_video_path_points_at_stored_bytes() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let cache = VideoCache::open(&config).unwrap();
        assert!(cache.initialize());
        assert!(cache.put("clip", b"frames"));

        let path = video_path(&config, "clip").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"frames");
        assert!(matches!(
            video_path(&config, "other"),
            Err(CliError::NotFound(_))
        ));
    }

    #[test]
    fn test_stats_and_clear() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let cache = VideoCache::open(&config).unwrap();
        assert!(cache.initialize());
        assert!(cache.put("a", &[0u8; 100]));
        assert!(cache.put("b", &[0u8; 50]));

        let before = stats(&config, Namespace::Video).unwrap();
        assert_eq!(before.entries, 2);
        assert_eq!(before.total_size, 150);
        assert_eq!(before.max_size, 1 << 20);

        clear(&config, Namespace::Video).unwrap();
        let after = stats(&config, Namespace::Video).unwrap();
        assert_eq!(after.entries, 0);
        assert_eq!(after.total_size, 0);
    }

    #[test]
    fn test_namespaces_are_separate() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let video = VideoCache::open(&config).unwrap();
        assert!(video.initialize());
        assert!(video.put("shared-key", b"video"));

        let settings = stats(&config, Namespace::Settings).unwrap();
        assert_eq!(settings.entries, 0);
    }
}
