//! Local-disk cache in front of a remote lake
//!
//! The query engine wants local files. `get_uri` hands back a cached copy,
//! downloading it on first use. Concurrent callers for one key share a single
//! download through a per-key async mutex; callers for different keys never
//! contend. A file present on disk is the only cache index.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::local::LocalStorageProvider;
use super::StorageProvider;
use crate::errors::{io_error, lock_poisoned, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub file_count: usize,
    pub total_bytes: u64,
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

pub struct CachingStorageProvider {
    inner: Arc<dyn StorageProvider>,
    cache: LocalStorageProvider,
    in_flight: Mutex<HashMap<String, KeyLock>>,
}

impl CachingStorageProvider {
    pub fn new(inner: Arc<dyn StorageProvider>, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            inner,
            cache: LocalStorageProvider::new(cache_dir)?,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        self.cache.root()
    }

    fn key_lock(&self, key: &str) -> Result<KeyLock> {
        let mut registry = self.in_flight.lock().map_err(|_| lock_poisoned())?;
        Ok(registry
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// Drop the registry entry once no other caller holds it
    fn release_key_lock(&self, key: &str, lock: &KeyLock) {
        if let Ok(mut registry) = self.in_flight.lock() {
            let idle = registry
                .get(key)
                .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(held) <= 2);
            if idle {
                registry.remove(key);
            }
        }
    }

    /// Local path of `key`, downloading it at most once across concurrent callers
    pub async fn cached_path(&self, key: &str) -> Result<String> {
        if self.cache.exists(key).await? {
            return self.cache.get_uri(key).await;
        }

        let lock = self.key_lock(key)?;
        let result: Result<String> = async {
            let _guard = lock.lock().await;
            // Another caller may have finished the download while we waited
            if !self.cache.exists(key).await? {
                let bytes = self.inner.read(key).await?;
                tracing::debug!(
                    component = module_path!(),
                    storage_key = key,
                    bytes = bytes.len(),
                    "Cached remote object"
                );
                self.cache.write(key, bytes).await?;
            }
            self.cache.get_uri(key).await
        }
        .await;
        self.release_key_lock(key, &lock);
        result
    }

    /// Wipe every cached file. The backing store is untouched.
    pub async fn clear_cache(&self) -> Result<()> {
        let root = self.cache.root().to_path_buf();
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("clear_cache", e)),
        }
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error("clear_cache", e))
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        let keys = self.cache.list("").await?;
        Ok(CacheStats {
            file_count: keys.len(),
            total_bytes: self.cache.total_size(&keys).await?,
        })
    }
}

#[async_trait]
impl StorageProvider for CachingStorageProvider {
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.inner.write(key, bytes).await?;
        // A stale copy must not outlive an overwrite
        self.cache.delete(key).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        if self.cache.exists(key).await? {
            return self.cache.read(key).await;
        }
        self.inner.read(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await?;
        self.cache.delete(key).await
    }

    async fn delete_all(&self, prefix: &str) -> Result<usize> {
        let removed = self.inner.delete_all(prefix).await?;
        self.cache.delete_all(prefix).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn get_uri(&self, key: &str) -> Result<String> {
        self.cached_path(key).await
    }

    async fn test_connection(&self) -> bool {
        self.inner.test_connection().await
    }
}
