//! Build the configured lake provider

use snaplake_core::cipher::CredentialCipher;
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::{StorageConfig, StorageKind};
use snaplake_core_types::Sensitive;
use std::path::Path;
use std::sync::Arc;

use super::cache::CachingStorageProvider;
use super::local::LocalStorageProvider;
use super::object::{ObjectStorageProvider, ObjectStorageSettings};
use super::StorageProvider;
use crate::errors::Result;

fn unseal(
    cipher: &CredentialCipher,
    value: Option<&Sensitive<String>>,
) -> Result<Option<Sensitive<String>>> {
    value
        .map(|v| {
            cipher
                .unseal(v.expose())
                .map(Sensitive::new)
                .map_err(ExError::from)
        })
        .transpose()
}

/// Unsealed S3 settings for an OBJECT config
pub fn object_settings(
    config: &StorageConfig,
    cipher: &CredentialCipher,
) -> Result<ObjectStorageSettings> {
    config.validate().map_err(ExError::from)?;
    Ok(ObjectStorageSettings {
        bucket: config.bucket.clone().unwrap_or_default(),
        region: config.region.clone().unwrap_or_default(),
        endpoint: config.endpoint.clone(),
        access_key: unseal(cipher, config.access_key.as_ref())?,
        secret_key: unseal(cipher, config.secret_key.as_ref())?,
    })
}

/// LOCAL configs get a plain filesystem provider. OBJECT configs are wrapped
/// in the caching decorator rooted at `cache_dir`.
pub fn build_storage_provider(
    config: &StorageConfig,
    cipher: &CredentialCipher,
    cache_dir: &Path,
) -> Result<Arc<dyn StorageProvider>> {
    config.validate().map_err(ExError::from)?;
    match config.kind {
        StorageKind::Local => {
            let root = config.local_path.clone().unwrap_or_default();
            Ok(Arc::new(LocalStorageProvider::new(root)?))
        }
        StorageKind::Object => {
            let remote = ObjectStorageProvider::s3(&object_settings(config, cipher)?)?;
            Ok(Arc::new(CachingStorageProvider::new(
                Arc::new(remote),
                cache_dir,
            )?))
        }
    }
}

/// Probe a provider, turning a failed probe into `StorageConnectionFailed`
pub async fn test_storage_connection(provider: &dyn StorageProvider) -> Result<()> {
    if provider.test_connection().await {
        Ok(())
    } else {
        Err(ExError::new(ExErrorKind::StorageConnectionFailed)
            .with_op("test_storage_connection")
            .with_message("Storage backend is not reachable or not writable"))
    }
}
