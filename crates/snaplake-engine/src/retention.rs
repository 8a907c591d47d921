//! Retention enforcement
//!
//! Applies a datasource's `RetentionPolicy` to its snapshots. Lake files go
//! first, metadata second, so a failed storage delete leaves the snapshot
//! listed and the next pass retries it.

use snaplake_core::model::{Datasource, SnapshotMeta};
use snaplake_core::{log_op_end, log_op_error, log_op_start};
use snaplake_store::lake::StorageProvider;
use snaplake_store::repo::SnapshotRepository;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::Result;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    /// Snapshot ids whose metadata was removed
    pub deleted: Vec<String>,
    /// Snapshot ids kept because a delete failed
    pub failed: Vec<String>,
}

pub struct RetentionEnforcer {
    snapshots: Arc<dyn SnapshotRepository>,
    storage: Arc<dyn StorageProvider>,
}

impl RetentionEnforcer {
    pub fn new(snapshots: Arc<dyn SnapshotRepository>, storage: Arc<dyn StorageProvider>) -> Self {
        Self { snapshots, storage }
    }

    /// Prune `datasource`'s snapshots beyond its policy limits
    ///
    /// Individual delete failures are collected in the report. Only a failure
    /// to list the snapshots is returned as an error.
    pub async fn enforce(&self, datasource: &Datasource) -> Result<RetentionReport> {
        let start = Instant::now();
        log_op_start!("enforce_retention", datasource_id = datasource.id());

        let snapshots = match self.snapshots.list_by_datasource(datasource.id()) {
            Ok(s) => s,
            Err(e) => {
                log_op_error!(
                    "enforce_retention",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
                return Err(e);
            }
        };

        let plan = datasource.retention().plan(&snapshots);
        let mut report = RetentionReport::default();

        for snapshot in &plan.expire {
            match self.storage.delete_all(&snapshot.storage_prefix()).await {
                Ok(removed) => {
                    tracing::debug!(
                        snapshot_id = snapshot.id(),
                        prefix = %snapshot.storage_prefix(),
                        removed,
                        "Deleted expired snapshot files"
                    );
                    self.delete_metadata(snapshot, &mut report);
                }
                Err(e) => {
                    tracing::warn!(
                        snapshot_id = snapshot.id(),
                        prefix = %snapshot.storage_prefix(),
                        error = %e,
                        "Could not delete expired snapshot files; keeping metadata"
                    );
                    report.failed.push(snapshot.id().to_string());
                }
            }
        }

        for snapshot in &plan.expire_metadata_only {
            self.delete_metadata(snapshot, &mut report);
        }

        log_op_end!(
            "enforce_retention",
            duration_ms = start.elapsed().as_millis() as u64,
            deleted = report.deleted.len(),
            failed = report.failed.len()
        );
        Ok(report)
    }

    fn delete_metadata(&self, snapshot: &SnapshotMeta, report: &mut RetentionReport) {
        match self.snapshots.delete(snapshot.id()) {
            Ok(_) => report.deleted.push(snapshot.id().to_string()),
            Err(e) => {
                tracing::warn!(
                    snapshot_id = snapshot.id(),
                    error = %e,
                    "Could not delete expired snapshot metadata"
                );
                report.failed.push(snapshot.id().to_string());
            }
        }
    }
}
