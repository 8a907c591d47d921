//! S3-compatible object storage lake

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::rules::validation::{validate_storage_key, validate_storage_prefix};
use snaplake_core_types::Sensitive;
use std::sync::Arc;

use super::StorageProvider;
use crate::errors::{from_object_store, Result};

/// Connection settings with credentials already unsealed
#[derive(Debug, Clone)]
pub struct ObjectStorageSettings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for MinIO and similar, scheme included
    pub endpoint: Option<String>,
    pub access_key: Option<Sensitive<String>>,
    pub secret_key: Option<Sensitive<String>>,
}

pub struct ObjectStorageProvider {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl std::fmt::Debug for ObjectStorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorageProvider")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl ObjectStorageProvider {
    /// Build an S3 client. Path-style addressing is used so custom endpoints work.
    pub fn s3(settings: &ObjectStorageSettings) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region)
            .with_virtual_hosted_style_request(false);

        if let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.is_empty()) {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(key) = &settings.access_key {
            builder = builder.with_access_key_id(key.expose());
        }
        if let Some(secret) = &settings.secret_key {
            builder = builder.with_secret_access_key(secret.expose());
        }

        let store = builder.build().map_err(|e| {
            ExError::new(ExErrorKind::Configuration)
                .with_op("build_object_store")
                .with_entity_id(settings.bucket.clone())
                .with_message(e.to_string())
        })?;

        Ok(Self::with_store(Arc::new(store), settings.bucket.clone()))
    }

    /// Wrap any object store (in-memory stores in tests)
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_path(key: &str) -> Result<ObjectPath> {
        validate_storage_key(key).map_err(ExError::from)?;
        ObjectPath::parse(key).map_err(|e| {
            ExError::new(ExErrorKind::InvalidStorageKey)
                .with_op("object_path")
                .with_entity_id(key)
                .with_message(e.to_string())
        })
    }
}

#[async_trait]
impl StorageProvider for ObjectStorageProvider {
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = Self::object_path(key)?;
        self.store
            .put(&path, PutPayload::from(bytes))
            .await
            .map_err(|e| from_object_store("write", key, e))?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = Self::object_path(key)?;
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| from_object_store("read", key, e))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| from_object_store("read", key, e))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        validate_storage_prefix(prefix).map_err(ExError::from)?;

        // Object store prefixes are whole path segments; filter the rest by string
        let dir = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let dir_path = if dir.is_empty() {
            None
        } else {
            Some(Self::object_path(dir)?)
        };

        let metas: Vec<_> = self
            .store
            .list(dir_path.as_ref())
            .try_collect()
            .await
            .map_err(|e| from_object_store("list", prefix, e))?;

        let mut keys: Vec<String> = metas
            .into_iter()
            .map(|m| m.location.to_string())
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = Self::object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(from_object_store("delete", key, e)),
        }
    }

    async fn delete_all(&self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Err(ExError::new(ExErrorKind::InvalidStorageKey)
                .with_op("delete_all")
                .with_message("Refusing to delete the whole bucket with an empty prefix"));
        }
        let keys = self.list(prefix).await?;
        for key in &keys {
            self.delete(key).await?;
        }
        Ok(keys.len())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = Self::object_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(from_object_store("exists", key, e)),
        }
    }

    async fn get_uri(&self, key: &str) -> Result<String> {
        validate_storage_key(key).map_err(ExError::from)?;
        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn test_connection(&self) -> bool {
        match self.store.list(None).try_next().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    component = module_path!(),
                    bucket = %self.bucket,
                    error = %e,
                    "Object storage probe failed"
                );
                false
            }
        }
    }
}
