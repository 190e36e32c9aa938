//! Cache service facade
//!
//! Composes key normalization, the disk store and async dispatch for one
//! namespace. The store is opened lazily and at most once; every public
//! operation turns failures into `false` / `None` plus a log line.

use crate::completion::{CompletionContext, CompletionThread};
use crate::config::{NamespaceConfig, VALUE_COUNT, VALUE_INDEX};
use crate::error::{CacheError, Result};
use crate::space::{disk_cache_size_bytes, DiskSpace, SystemDiskSpace};
use disk_lru_cache::{CacheStats, DiskLruCache, NormalizedKey, StoreConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

struct Shared {
    namespace: NamespaceConfig,
    space: Arc<dyn DiskSpace>,
    completion: Arc<dyn CompletionContext>,
    runtime: Option<Handle>,
    store: RwLock<Option<Arc<DiskLruCache>>>,
}

/// Handle to one cache namespace. Clones share the same store.
#[derive(Clone)]
pub struct CacheService {
    shared: Arc<Shared>,
}

pub struct CacheServiceBuilder {
    namespace: NamespaceConfig,
    completion: Option<Arc<dyn CompletionContext>>,
    space: Option<Arc<dyn DiskSpace>>,
    runtime: Option<Handle>,
}

impl CacheServiceBuilder {
    /// Where async callbacks run. Defaults to a dedicated thread per service.
    pub fn completion(mut self, completion: Arc<dyn CompletionContext>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Free space query used when the namespace has no explicit budget
    pub fn disk_space(mut self, space: Arc<dyn DiskSpace>) -> Self {
        self.space = Some(space);
        self
    }

    /// Runtime for async work. Defaults to the runtime current at build time.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<CacheService> {
        let completion: Arc<dyn CompletionContext> = match self.completion {
            Some(completion) => completion,
            None => Arc::new(CompletionThread::spawn(format!(
                "{}-completion",
                self.namespace.name
            ))?),
        };

        Ok(CacheService {
            shared: Arc::new(Shared {
                namespace: self.namespace,
                space: self
                    .space
                    .unwrap_or_else(|| Arc::new(SystemDiskSpace) as Arc<dyn DiskSpace>),
                completion,
                runtime: self.runtime.or_else(|| Handle::try_current().ok()),
                store: RwLock::new(None),
            }),
        })
    }
}

impl CacheService {
    pub fn builder(namespace: NamespaceConfig) -> CacheServiceBuilder {
        CacheServiceBuilder {
            namespace,
            completion: None,
            space: None,
            runtime: None,
        }
    }

    pub fn new(namespace: NamespaceConfig) -> Result<Self> {
        Self::builder(namespace).build()
    }

    pub fn namespace(&self) -> &NamespaceConfig {
        &self.shared.namespace
    }

    pub(crate) fn store(&self) -> Option<Arc<DiskLruCache>> {
        self.shared
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.store().is_some()
    }

    /// Open the namespace's store if it isn't open yet. Concurrent callers
    /// wait for a single open and all see the same store.
    pub fn initialize(&self) -> bool {
        if self.is_initialized() {
            return true;
        }

        let mut slot = self
            .shared
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return true;
        }

        let namespace = &self.shared.namespace;
        let max_size = namespace.max_size.unwrap_or_else(|| {
            disk_cache_size_bytes(self.shared.space.as_ref(), &namespace.directory)
        });
        let config = StoreConfig {
            max_entries: namespace.max_entries,
            ..StoreConfig::new(namespace.app_version, VALUE_COUNT, max_size)
        };

        match DiskLruCache::open(&namespace.directory, config) {
            Ok(store) => {
                info!(
                    namespace = %namespace.name,
                    directory = ?namespace.directory,
                    max_size,
                    "Cache namespace initialized"
                );
                *slot = Some(Arc::new(store));
                true
            }
            Err(err) => {
                warn!(
                    namespace = %namespace.name,
                    directory = ?namespace.directory,
                    error = %err,
                    "Failed to initialize cache namespace"
                );
                false
            }
        }
    }

    fn initialized_store(&self) -> Result<Arc<DiskLruCache>> {
        self.store().ok_or_else(|| {
            CacheError::Initialization(format!(
                "namespace {} is not initialized",
                self.shared.namespace.name
            ))
        })
    }

    pub(crate) fn try_put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("empty cache key".to_string()));
        }
        let store = self.initialized_store()?;
        let key = NormalizedKey::from_raw(key);

        let mut editor = store.edit(key.as_str())?;
        if let Err(err) = editor.set(VALUE_INDEX, bytes) {
            if let Err(abort_err) = editor.abort() {
                debug!(key = %key, error = %abort_err, "Failed to abort edit");
            }
            return Err(err.into());
        }
        editor.commit()?;
        store.flush()?;
        Ok(())
    }

    pub(crate) fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("empty cache key".to_string()));
        }
        let store = self.initialized_store()?;
        let key = NormalizedKey::from_raw(key);

        match store.get(key.as_str())? {
            Some(mut snapshot) => Ok(Some(snapshot.read_value(VALUE_INDEX)?)),
            None => Ok(None),
        }
    }

    fn log_failure(&self, operation: &str, err: &CacheError) {
        let namespace = &self.shared.namespace.name;
        match err {
            CacheError::InvalidArgument(_) | CacheError::Initialization(_) => {
                debug!(namespace = %namespace, operation, error = %err, "Cache operation skipped")
            }
            _ => warn!(namespace = %namespace, operation, error = %err, "Cache operation failed"),
        }
    }

    /// Store `bytes` under `key`, replacing any previous value
    pub fn put_sync(&self, key: &str, bytes: &[u8]) -> bool {
        match self.try_put(key, bytes) {
            Ok(()) => true,
            Err(err) => {
                self.log_failure("put", &err);
                false
            }
        }
    }

    /// Value stored under `key`. Misses and read errors both yield `None`.
    pub fn get_sync(&self, key: &str) -> Option<Vec<u8>> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(err) => {
                self.log_failure("get", &err);
                None
            }
        }
    }

    /// Stream the value stored under `key` into `writer` without buffering
    /// it in memory. Returns the number of bytes copied, `None` on a miss or
    /// error.
    pub fn copy_to<W: Write + ?Sized>(&self, key: &str, writer: &mut W) -> Option<u64> {
        match self.try_copy_to(key, writer) {
            Ok(copied) => copied,
            Err(err) => {
                self.log_failure("copy", &err);
                None
            }
        }
    }

    pub(crate) fn try_copy_to<W: Write + ?Sized>(
        &self,
        key: &str,
        writer: &mut W,
    ) -> Result<Option<u64>> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("empty cache key".to_string()));
        }
        let store = self.initialized_store()?;
        let key = NormalizedKey::from_raw(key);

        let Some(mut snapshot) = store.get(key.as_str())? else {
            return Ok(None);
        };
        let Some(reader) = snapshot.reader(VALUE_INDEX) else {
            return Ok(None);
        };
        let copied = io::copy(reader, writer)?;
        debug!(key = snapshot.key(), bytes = copied, "Copied cached value");
        Ok(Some(copied))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        let Some(store) = self.store() else {
            return false;
        };
        let key = NormalizedKey::from_raw(key);
        match store.get(key.as_str()) {
            Ok(snapshot) => snapshot.is_some(),
            Err(err) => {
                self.log_failure("contains", &CacheError::from(err));
                false
            }
        }
    }

    /// Path of the file that holds (or would hold) the value for `key`
    pub fn value_path(&self, key: &str) -> Option<PathBuf> {
        if key.is_empty() {
            return None;
        }
        let key = NormalizedKey::from_raw(key);
        self.store()
            .map(|store| store.value_path(key.as_str(), VALUE_INDEX))
    }

    pub fn stats(&self) -> Option<CacheStats> {
        self.store().map(|store| store.stats())
    }

    /// Delete the store and everything in it. The next operation that needs
    /// the store opens a fresh one.
    pub fn clear(&self) {
        // Held until the directory is gone so no new store opens inside it
        let mut slot = self
            .shared
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(store) = slot.take() {
            match store.delete() {
                Ok(()) => info!(namespace = %self.shared.namespace.name, "Cache namespace cleared"),
                Err(err) => warn!(
                    namespace = %self.shared.namespace.name,
                    error = %err,
                    "Failed to delete cache namespace"
                ),
            }
        }
    }

    /// Store `bytes` under `key` off the calling thread, then report success
    /// on the completion context
    pub fn put_async<F>(&self, key: impl Into<String>, bytes: Vec<u8>, on_complete: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let key = key.into();
        self.dispatch(
            move |service| service.initialize() && service.put_sync(&key, &bytes),
            false,
            on_complete,
        );
    }

    /// Look up `key` off the calling thread, then report the value on the
    /// completion context
    pub fn get_async<F>(&self, key: impl Into<String>, on_complete: F)
    where
        F: FnOnce(Option<Vec<u8>>) + Send + 'static,
    {
        let key = key.into();
        self.dispatch(
            move |service| {
                if !service.initialize() {
                    return None;
                }
                service.get_sync(&key)
            },
            None,
            on_complete,
        );
    }

    pub async fn put(&self, key: impl Into<String>, bytes: Vec<u8>) -> bool {
        let key = key.into();
        self.run_blocking(move |service| service.initialize() && service.put_sync(&key, &bytes))
            .await
            .unwrap_or(false)
    }

    pub async fn get(&self, key: impl Into<String>) -> Option<Vec<u8>> {
        let key = key.into();
        self.run_blocking(move |service| {
            if !service.initialize() {
                return None;
            }
            service.get_sync(&key)
        })
        .await
        .flatten()
    }

    /// Run `work` on the blocking pool; `None` if it panicked or was cancelled
    async fn run_blocking<T, W>(&self, work: W) -> Option<T>
    where
        T: Send + 'static,
        W: FnOnce(&CacheService) -> T + Send + 'static,
    {
        let service = self.clone();
        match tokio::task::spawn_blocking(move || work(&service)).await {
            Ok(value) => Some(value),
            Err(err) => {
                error!(
                    namespace = %self.shared.namespace.name,
                    error = %err,
                    "Cache operation faulted"
                );
                None
            }
        }
    }

    /// Deliver `value` to `on_complete` on the completion context without
    /// touching the store
    pub(crate) fn complete_with<T, F>(&self, on_complete: F, value: T)
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        self.shared
            .completion
            .dispatch(Box::new(move || on_complete(value)));
    }

    /// Spawn `work` as its own task and hand the result to the completion
    /// context. Tasks are independent: one faulting never affects another.
    fn dispatch<T, W, F>(&self, work: W, on_fault: T, on_complete: F)
    where
        T: Send + 'static,
        W: FnOnce(&CacheService) -> T + Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let pending = PendingCompletion::new(
            Arc::clone(&self.shared.completion),
            on_complete,
            on_fault,
        );
        let runtime = match self.shared.runtime.clone() {
            Some(runtime) => runtime,
            None => match Handle::try_current() {
                Ok(runtime) => runtime,
                Err(_) => {
                    warn!(
                        namespace = %self.shared.namespace.name,
                        "No async runtime available, failing cache operation"
                    );
                    pending.fail();
                    return;
                }
            },
        };

        // A runtime that has shut down drops the task unpolled; the pending
        // completion then reports the failure value on drop
        let service = self.clone();
        runtime.spawn(async move {
            match service.run_blocking(work).await {
                Some(value) => pending.complete(value),
                None => pending.fail(),
            }
        });
    }
}

/// A completion callback still owed to the caller.
///
/// Dropping it without calling [`PendingCompletion::complete`] delivers the
/// failure value instead, so the callback runs exactly once.
struct PendingCompletion<T, F>
where
    T: Send + 'static,
    F: FnOnce(T) + Send + 'static,
{
    completion: Arc<dyn CompletionContext>,
    callback: Option<(F, T)>,
}

impl<T, F> PendingCompletion<T, F>
where
    T: Send + 'static,
    F: FnOnce(T) + Send + 'static,
{
    fn new(completion: Arc<dyn CompletionContext>, on_complete: F, on_fault: T) -> Self {
        Self {
            completion,
            callback: Some((on_complete, on_fault)),
        }
    }

    fn complete(mut self, value: T) {
        if let Some((on_complete, _)) = self.callback.take() {
            self.completion
                .dispatch(Box::new(move || on_complete(value)));
        }
    }

    /// Report the failure value
    fn fail(self) {
        drop(self)
    }
}

impl<T, F> Drop for PendingCompletion<T, F>
where
    T: Send + 'static,
    F: FnOnce(T) + Send + 'static,
{
    fn drop(&mut self) {
        if let Some((on_complete, on_fault)) = self.callback.take() {
            self.completion
                .dispatch(Box::new(move || on_complete(on_fault)));
        }
    }
}
