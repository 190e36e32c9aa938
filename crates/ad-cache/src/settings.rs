//! Per-ad-unit settings cache
//!
//! Stores the serialized settings blob of each ad unit in the
//! `settings-cache` namespace so the SDK can tell whether the server copy
//! changed without refetching it.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::service::CacheService;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hash reported for ad units with no cached settings
pub const DEFAULT_HASH: &str = "0";

/// Settings for one ad unit as served by the ad server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdUnitSettings {
    pub hash: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AdUnitSettings {
    pub fn new(hash: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            hash: hash.into(),
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn decode(ad_unit_id: &str, bytes: Vec<u8>) -> Option<AdUnitSettings> {
    match AdUnitSettings::from_bytes(&bytes) {
        Ok(settings) => Some(settings),
        Err(err) => {
            warn!(ad_unit_id, error = %err, "Discarding unreadable cached settings");
            None
        }
    }
}

fn hash_or_default(settings: Option<AdUnitSettings>) -> String {
    settings
        .map(|settings| settings.hash)
        .unwrap_or_else(|| DEFAULT_HASH.to_string())
}

#[derive(Clone)]
pub struct SettingsCache {
    service: CacheService,
}

impl SettingsCache {
    pub fn new(service: CacheService) -> Self {
        Self { service }
    }

    /// Settings cache in the configured `settings-cache` namespace
    pub fn open(config: &CacheConfig) -> Result<Self> {
        Ok(Self::new(CacheService::new(config.settings_namespace())?))
    }

    pub fn service(&self) -> &CacheService {
        &self.service
    }

    pub fn initialize(&self) -> bool {
        self.service.initialize()
    }

    pub fn put<F>(&self, ad_unit_id: &str, settings: &AdUnitSettings, on_complete: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        match settings.to_bytes() {
            Ok(bytes) => self.service.put_async(ad_unit_id, bytes, on_complete),
            Err(err) => {
                warn!(ad_unit_id, error = %err, "Failed to serialize settings");
                self.service.complete_with(on_complete, false);
            }
        }
    }

    pub fn get_settings<F>(&self, ad_unit_id: &str, on_complete: F)
    where
        F: FnOnce(Option<AdUnitSettings>) + Send + 'static,
    {
        let id = ad_unit_id.to_string();
        self.service.get_async(ad_unit_id, move |bytes| {
            on_complete(bytes.and_then(|bytes| decode(&id, bytes)))
        });
    }

    /// Hash of the cached settings, or [`DEFAULT_HASH`] when there are none
    pub fn get_hash<F>(&self, ad_unit_id: &str, on_complete: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.get_settings(ad_unit_id, move |settings| {
            on_complete(hash_or_default(settings))
        });
    }

    pub fn put_sync(&self, ad_unit_id: &str, settings: &AdUnitSettings) -> bool {
        match settings.to_bytes() {
            Ok(bytes) => self.service.put_sync(ad_unit_id, &bytes),
            Err(err) => {
                warn!(ad_unit_id, error = %err, "Failed to serialize settings");
                false
            }
        }
    }

    pub fn get_settings_sync(&self, ad_unit_id: &str) -> Option<AdUnitSettings> {
        self.service
            .get_sync(ad_unit_id)
            .and_then(|bytes| decode(ad_unit_id, bytes))
    }

    pub fn get_hash_sync(&self, ad_unit_id: &str) -> String {
        hash_or_default(self.get_settings_sync(ad_unit_id))
    }

    pub fn clear(&self) {
        self.service.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NamespaceConfig, SETTINGS_NAMESPACE};
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::tempdir;

    const WAIT: Duration = Duration::from_secs(5);

    fn settings_cache(root: &std::path::Path) -> SettingsCache {
        let namespace = NamespaceConfig::new(SETTINGS_NAMESPACE, root).with_max_size(1 << 20);
        SettingsCache::new(CacheService::new(namespace).unwrap())
    }

    #[test]
    fn test_settings_serialization() {
        let settings = AdUnitSettings::new("12345", json!({"refresh": 30}));
        let bytes = settings.to_bytes().unwrap();
        let json = String::from_utf8(bytes.clone()).unwrap();
        assert!(json.contains("12345"));

        assert_eq!(AdUnitSettings::from_bytes(&bytes).unwrap(), settings);
    }

    #[test]
    fn test_payload_is_optional() {
        let settings = AdUnitSettings::from_bytes(br#"{"hash":"abc"}"#).unwrap();
        assert_eq!(settings.hash, "abc");
        assert!(settings.payload.is_null());
    }

    #[test]
    fn test_sync_hash_lookup() {
        let dir = tempdir().unwrap();
        let cache = settings_cache(dir.path());
        assert!(cache.initialize());

        assert!(cache.put_sync("adUnit123", &AdUnitSettings::new("12345", json!({}))));

        assert_eq!(cache.get_hash_sync("adUnit123"), "12345");
        assert_eq!(cache.get_hash_sync("unknownUnit"), DEFAULT_HASH);
    }

    #[test]
    fn test_results_match_direct_service_calls() {
        let dir = tempdir().unwrap();
        let cache = settings_cache(dir.path());
        assert!(cache.initialize());
        let settings = AdUnitSettings::new("777", json!({"formats": ["banner"]}));
        assert!(cache.put_sync("adUnit9", &settings));

        let raw = cache.service().get_sync("adUnit9").unwrap();
        assert_eq!(raw, settings.to_bytes().unwrap());
        assert_eq!(cache.get_settings_sync("adUnit9").unwrap(), settings);
    }

    #[test]
    fn test_unreadable_blob_reports_default_hash() {
        let dir = tempdir().unwrap();
        let cache = settings_cache(dir.path());
        assert!(cache.initialize());
        assert!(cache.service().put_sync("adUnitBad", b"not json"));

        assert!(cache.get_settings_sync("adUnitBad").is_none());
        assert_eq!(cache.get_hash_sync("adUnitBad"), DEFAULT_HASH);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_hash_lookup() {
        let dir = tempdir().unwrap();
        let cache = settings_cache(dir.path());

        let (tx, rx) = mpsc::channel();
        cache.put(
            "adUnit123",
            &AdUnitSettings::new("12345", json!({"refresh": 30})),
            move |ok| tx.send(ok).unwrap(),
        );
        assert!(rx.recv_timeout(WAIT).unwrap());

        let (tx, rx) = mpsc::channel();
        cache.get_hash("adUnit123", move |hash| tx.send(hash).unwrap());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "12345");

        let (tx, rx) = mpsc::channel();
        cache.get_hash("unknownUnit", move |hash| tx.send(hash).unwrap());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), DEFAULT_HASH);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_get_settings() {
        let dir = tempdir().unwrap();
        let cache = settings_cache(dir.path());
        let settings = AdUnitSettings::new("42", json!({"timeout_ms": 5000}));

        let (tx, rx) = mpsc::channel();
        cache.put("adUnit42", &settings, move |ok| tx.send(ok).unwrap());
        assert!(rx.recv_timeout(WAIT).unwrap());

        let (tx, rx) = mpsc::channel();
        cache.get_settings("adUnit42", move |value| tx.send(value).unwrap());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(settings));
    }

    #[test]
    fn test_clear_drops_settings() {
        let dir = tempdir().unwrap();
        let cache = settings_cache(dir.path());
        assert!(cache.initialize());
        assert!(cache.put_sync("adUnit123", &AdUnitSettings::new("12345", json!(null))));

        cache.clear();
        assert_eq!(cache.get_hash_sync("adUnit123"), DEFAULT_HASH);
    }
}
