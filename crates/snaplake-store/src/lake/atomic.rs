//! Atomic write primitives
//!
//! Uses temp→rename so readers never observe a partially written file

use crate::errors::{io_error, Result};
use std::path::{Path, PathBuf};

const TEMP_SUFFIX: &str = ".partial";

/// Temp files carry this suffix and are skipped by listings
pub fn is_temp_file(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Unique per writer so concurrent writes to one key cannot clobber each other's temp
    target.with_file_name(format!(
        ".{}.{}{}",
        name,
        uuid::Uuid::new_v4().simple(),
        TEMP_SUFFIX
    ))
}

/// Atomically write bytes to a file, creating parent directories
pub async fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error("create_lake_dir", e))?;
    }

    let temp_path = temp_path_for(target_path);

    if let Err(e) = tokio::fs::write(&temp_path, content).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(io_error("write_lake_temp", e));
    }

    if let Err(e) = tokio::fs::rename(&temp_path, target_path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(io_error("rename_lake_temp", e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_atomic_write_creates_parent() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("subdir").join("test.parquet");

        atomic_write(&target, b"nested").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"nested");
    }

    #[tokio::test]
    async fn test_no_temp_files_after_write() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("test.parquet");

        atomic_write(&target, b"one").await.unwrap();
        atomic_write(&target, b"two").await.unwrap();

        let leftovers = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_temp_file(&e.file_name().to_string_lossy()))
            .count();
        assert_eq!(leftovers, 0);
        assert_eq!(std::fs::read(&target).unwrap(), b"two");
    }
}
