//! Error handling for snaplake-store
//!
//! Wraps snaplake-core ExError with store-specific helpers

use snaplake_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: recorded {}, embedded {}",
            migration_id, expected, actual
        ))
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Missing blob in the lake
pub fn object_not_found(operation: &str, key: &str) -> ExError {
    ExError::new(ExErrorKind::NotFound)
        .with_op(operation.to_string())
        .with_entity_id(key)
        .with_message(format!("No object stored at '{}'", key))
}

/// Create an error from an object store failure
pub fn from_object_store(operation: &str, key: &str, err: object_store::Error) -> ExError {
    match err {
        object_store::Error::NotFound { .. } => object_not_found(operation, key),
        other => ExError::new(ExErrorKind::Io)
            .with_op(operation.to_string())
            .with_entity_id(key)
            .with_message(other.to_string()),
    }
}

/// Connection mutex was poisoned by a panicking holder
pub fn lock_poisoned() -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op("db_lock")
        .with_message("Database connection lock poisoned")
}
