//! Lake storage providers
//!
//! Keys are opaque, relative, `/`-separated strings such as
//! `shop/daily/2024-03-09/public.orders.parquet`. Every provider validates
//! keys before touching the backing store.

pub mod atomic;
pub mod cache;
pub mod factory;
pub mod local;
pub mod object;

use async_trait::async_trait;

use crate::errors::Result;

pub use cache::{CacheStats, CachingStorageProvider};
pub use factory::{build_storage_provider, test_storage_connection};
pub use local::LocalStorageProvider;
pub use object::ObjectStorageProvider;

#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// `NotFound` if nothing is stored at `key`
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Keys starting with `prefix`, sorted. An empty prefix lists everything.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key under `prefix` and return how many were removed
    async fn delete_all(&self, prefix: &str) -> Result<usize>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Locator the query engine can open: a filesystem path or `s3://bucket/key`
    async fn get_uri(&self, key: &str) -> Result<String>;

    /// Probe the backing store. Failures are logged, never raised.
    async fn test_connection(&self) -> bool;
}
