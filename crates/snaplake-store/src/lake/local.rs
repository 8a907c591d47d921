//! Filesystem-backed lake rooted at a directory

use async_trait::async_trait;
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::rules::validation::{validate_storage_key, validate_storage_prefix};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::atomic::{atomic_write, is_temp_file};
use super::StorageProvider;
use crate::errors::{io_error, object_not_found, Result};

#[derive(Debug, Clone)]
pub struct LocalStorageProvider {
    root: PathBuf,
}

impl LocalStorageProvider {
    /// Relative roots are resolved against the current directory once, so
    /// the URIs handed to the query engine are absolute
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map_err(|e| io_error("resolve_lake_root", e))?
                .join(root)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_storage_key(key).map_err(ExError::from)?;
        Ok(key
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    /// Walk the tree below `root`, collecting `/`-joined relative keys
    async fn walk(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error("list_lake_dir", e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error("list_lake_dir", e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if rel.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", rel, name)
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| io_error("list_lake_dir", e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if !is_temp_file(&name) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Remove now-empty directories from `dir` up to (not including) root
    async fn prune_empty_dirs(&self, mut dir: PathBuf) {
        while dir != self.root && dir.starts_with(&self.root) {
            if tokio::fs::remove_dir(&dir).await.is_err() {
                break;
            }
            if !dir.pop() {
                break;
            }
        }
    }

    /// Total size in bytes of the given keys
    pub async fn total_size(&self, keys: &[String]) -> Result<u64> {
        let mut total = 0;
        for key in keys {
            let meta = tokio::fs::metadata(self.path_for(key)?)
                .await
                .map_err(|e| io_error("stat_lake_file", e))?;
            total += meta.len();
        }
        Ok(total)
    }
}

#[async_trait]
impl StorageProvider for LocalStorageProvider {
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        atomic_write(&path, &bytes).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(object_not_found("read", key)),
            Err(e) => Err(io_error("read_lake_file", e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        validate_storage_prefix(prefix).map_err(ExError::from)?;
        Ok(self
            .walk()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                if let Some(parent) = path.parent() {
                    self.prune_empty_dirs(parent.to_path_buf()).await;
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete_lake_file", e)),
        }
    }

    async fn delete_all(&self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Err(ExError::new(ExErrorKind::InvalidStorageKey)
                .with_op("delete_all")
                .with_message("Refusing to delete the whole lake with an empty prefix"));
        }
        let keys = self.list(prefix).await?;
        for key in &keys {
            self.delete(key).await?;
        }
        Ok(keys.len())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("stat_lake_file", e)),
        }
    }

    async fn get_uri(&self, key: &str) -> Result<String> {
        Ok(self.path_for(key)?.to_string_lossy().into_owned())
    }

    async fn test_connection(&self) -> bool {
        let probe = format!(".probe-{}", uuid::Uuid::new_v4().simple());
        let result: Result<()> = async {
            self.write(&probe, b"ok".to_vec()).await?;
            self.delete(&probe).await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    component = module_path!(),
                    root = %self.root.display(),
                    error = %e,
                    "Local storage probe failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalStorageProvider::new(dir.path()).unwrap();
        let err = provider
            .write("../outside.parquet", b"x".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidStorageKey);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalStorageProvider::new(dir.path()).unwrap();
        assert!(provider.delete("nope/missing.parquet").await.is_ok());
    }
}
