//! Error helpers for snaplake-engine
//!
//! The engine shares the store's `ExError`-based `Result`; these helpers map
//! the third-party failures the engine meets into canonical kinds.

use snaplake_core::errors::{ExError, ExErrorKind};

pub use snaplake_store::errors::Result;

pub fn datasource_not_found(op: &str, id: &str) -> ExError {
    ExError::new(ExErrorKind::DatasourceNotFound)
        .with_op(op)
        .with_entity_id(id)
        .with_message(format!("Datasource '{}' does not exist", id))
}

pub fn snapshot_already_running(op: &str, datasource_id: &str) -> ExError {
    ExError::new(ExErrorKind::SnapshotAlreadyRunning)
        .with_op(op)
        .with_entity_id(datasource_id)
        .with_message("A snapshot is already running for this datasource")
}

pub fn connection_failed(op: &str, message: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::DatasourceConnectionFailed)
        .with_op(op)
        .with_message(message)
}

/// Failure while talking to an already-open source
pub fn source_query(op: &str, entity: &str, message: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::DatasourceConnectionFailed)
        .with_op(op)
        .with_entity_id(entity)
        .with_message(message)
}

pub fn columnar_error(op: &str, message: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(op)
        .with_message(message)
}

pub fn query_failed(op: &str, err: duckdb::Error) -> ExError {
    ExError::new(ExErrorKind::QueryExecutionFailed)
        .with_op(op)
        .with_message(err.to_string())
}

pub fn internal(op: &str, message: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op(op)
        .with_message(message)
}
