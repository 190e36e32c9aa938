//! Video asset cache
//!
//! Raw video bytes keyed by an arbitrary cache key (usually the media URL)
//! in the `video-cache` namespace. Players that stream from disk can ask
//! for the backing file with [`VideoCache::get_file_path`].

use crate::config::CacheConfig;
use crate::error::Result;
use crate::service::CacheService;
use std::io::Write;
use std::path::PathBuf;

#[derive(Clone)]
pub struct VideoCache {
    service: CacheService,
}

impl VideoCache {
    pub fn new(service: CacheService) -> Self {
        Self { service }
    }

    /// Video cache in the configured `video-cache` namespace
    pub fn open(config: &CacheConfig) -> Result<Self> {
        Ok(Self::new(CacheService::new(config.video_namespace())?))
    }

    pub fn service(&self) -> &CacheService {
        &self.service
    }

    pub fn initialize(&self) -> bool {
        self.service.initialize()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.service.get_sync(key)
    }

    pub fn put(&self, key: &str, content: &[u8]) -> bool {
        self.service.put_sync(key, content)
    }

    pub fn put_async<F>(&self, key: impl Into<String>, content: Vec<u8>, on_complete: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.service.put_async(key, content, on_complete)
    }

    pub fn get_async<F>(&self, key: impl Into<String>, on_complete: F)
    where
        F: FnOnce(Option<Vec<u8>>) + Send + 'static,
    {
        self.service.get_async(key, on_complete)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.service.contains_key(key)
    }

    /// Where the bytes for `key` live on disk. The file only exists once a
    /// put for `key` has completed.
    pub fn get_file_path(&self, key: &str) -> Option<PathBuf> {
        self.service.value_path(key)
    }

    /// Stream the cached video into `writer`, returning the bytes copied
    pub fn copy_to<W: Write + ?Sized>(&self, key: &str, writer: &mut W) -> Option<u64> {
        self.service.copy_to(key, writer)
    }

    pub fn clear(&self) {
        self.service.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NamespaceConfig, VIDEO_NAMESPACE};
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::tempdir;

    const VIDEO_URL: &str = "https://cdn.example.com/creative/intro.mp4";

    fn video_cache(root: &std::path::Path, max_size: u64) -> VideoCache {
        let namespace = NamespaceConfig::new(VIDEO_NAMESPACE, root).with_max_size(max_size);
        VideoCache::new(CacheService::new(namespace).unwrap())
    }

    #[test]
    fn test_put_get_and_contains() {
        let dir = tempdir().unwrap();
        let cache = video_cache(dir.path(), 1 << 20);
        assert!(cache.initialize());

        assert!(!cache.contains_key(VIDEO_URL));
        assert!(cache.put(VIDEO_URL, b"\x00\x00\x00\x18ftypmp42"));

        assert!(cache.contains_key(VIDEO_URL));
        assert_eq!(cache.get(VIDEO_URL).unwrap(), b"\x00\x00\x00\x18ftypmp42");
    }

    #[test]
    fn test_file_path_holds_video_bytes() {
        let dir = tempdir().unwrap();
        let cache = video_cache(dir.path(), 1 << 20);
        assert!(cache.initialize());
        assert!(cache.put(VIDEO_URL, b"frames"));

        let path = cache.get_file_path(VIDEO_URL).unwrap();
        assert!(path.starts_with(dir.path().join(VIDEO_NAMESPACE)));
        assert_eq!(std::fs::read(&path).unwrap(), b"frames");
        assert_eq!(path, cache.service().value_path(VIDEO_URL).unwrap());
    }

    #[test]
    fn test_file_path_requires_initialized_cache() {
        let dir = tempdir().unwrap();
        let cache = video_cache(dir.path(), 1 << 20);

        assert!(cache.get_file_path(VIDEO_URL).is_none());
        assert!(cache.get_file_path("").is_none());
    }

    #[test]
    fn test_large_videos_evict_older_ones() {
        let dir = tempdir().unwrap();
        let cache = video_cache(dir.path(), 1000);
        assert!(cache.initialize());

        assert!(cache.put("video-a", &[1u8; 400]));
        assert!(cache.put("video-b", &[2u8; 400]));
        assert!(cache.put("video-c", &[3u8; 400]));

        assert!(!cache.contains_key("video-a"));
        assert!(cache.contains_key("video-b"));
        assert!(cache.contains_key("video-c"));
    }

    #[test]
    fn test_copy_streams_video_bytes() {
        let dir = tempdir().unwrap();
        let cache = video_cache(dir.path(), 1 << 20);
        assert!(cache.initialize());
        let video = vec![9u8; 64 * 1024];
        assert!(cache.put(VIDEO_URL, &video));

        let mut out = Vec::new();
        assert_eq!(cache.copy_to(VIDEO_URL, &mut out), Some(video.len() as u64));
        assert_eq!(out, video);

        let mut out = Vec::new();
        assert_eq!(cache.copy_to("missing", &mut out), None);
        assert!(out.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_put_and_get() {
        let dir = tempdir().unwrap();
        let cache = video_cache(dir.path(), 1 << 20);

        let (tx, rx) = mpsc::channel();
        cache.put_async(VIDEO_URL, vec![7u8; 1024], move |ok| tx.send(ok).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());

        let (tx, rx) = mpsc::channel();
        cache.get_async(VIDEO_URL, move |value| tx.send(value).unwrap());
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(),
            vec![7u8; 1024]
        );
    }
}
