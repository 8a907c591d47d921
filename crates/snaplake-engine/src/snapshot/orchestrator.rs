//! Snapshot orchestration
//!
//! ## Run sequence (in order):
//! 1. Load the datasource (`DatasourceNotFound`)
//! 2. Claim it in-process, then check the repository for a RUNNING snapshot
//!    (`SnapshotAlreadyRunning`)
//! 3. Persist a RUNNING snapshot dated by the clock's UTC day
//! 4. Connect, then per schema and allowed table: primary keys, Parquet
//!    export, lake write, append + persist
//! 5. Persist COMPLETED or FAILED; written tables stay in the lake either way
//! 6. After COMPLETED, enforce retention (failures logged only)

use async_trait::async_trait;
use snaplake_core::cipher::CredentialCipher;
use snaplake_core::clock::Clock;
use snaplake_core::errors::ExError;
use snaplake_core::model::{Datasource, SnapshotKind, SnapshotMeta, TableMeta};
use snaplake_core::{log_op_end, log_op_error, log_op_start};
use snaplake_core_types::Sensitive;
use snaplake_store::lake::StorageProvider;
use snaplake_store::repo::{DatasourceRepository, SnapshotRepository};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::dialect::{ConnectionTarget, DialectRegistry};
use crate::errors::{datasource_not_found, internal, snapshot_already_running, Result};
use crate::retention::RetentionEnforcer;

/// Something that can be asked to snapshot a datasource on a timer
#[async_trait]
pub trait SnapshotTrigger: Send + Sync {
    async fn trigger(&self, datasource_id: &str);
}

pub struct SnapshotOrchestrator {
    datasources: Arc<dyn DatasourceRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    dialects: Arc<DialectRegistry>,
    storage: Arc<dyn StorageProvider>,
    cipher: Arc<CredentialCipher>,
    clock: Arc<dyn Clock>,
    retention: RetentionEnforcer,
    claims: Mutex<HashSet<String>>,
}

/// Releases an in-process claim when the run ends, however it ends
struct Claim<'a> {
    claims: &'a Mutex<HashSet<String>>,
    datasource_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Ok(mut claims) = self.claims.lock() {
            claims.remove(&self.datasource_id);
        }
    }
}

impl SnapshotOrchestrator {
    pub fn new(
        datasources: Arc<dyn DatasourceRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        dialects: Arc<DialectRegistry>,
        storage: Arc<dyn StorageProvider>,
        cipher: Arc<CredentialCipher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retention = RetentionEnforcer::new(snapshots.clone(), storage.clone());
        Self {
            datasources,
            snapshots,
            dialects,
            storage,
            cipher,
            clock,
            retention,
            claims: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, datasource_id: &str) -> Result<Claim<'_>> {
        let mut claims = self
            .claims
            .lock()
            .map_err(|_| internal("claim_datasource", "claim set lock poisoned"))?;
        if !claims.insert(datasource_id.to_string()) {
            return Err(snapshot_already_running("take_snapshot", datasource_id));
        }
        Ok(Claim {
            claims: &self.claims,
            datasource_id: datasource_id.to_string(),
        })
    }

    /// Run one snapshot of `datasource_id` to completion
    ///
    /// Extraction failures do not surface as `Err`: the returned snapshot is
    /// FAILED with the cause in `error_message`.
    ///
    /// # Errors
    /// `DatasourceNotFound`, `SnapshotAlreadyRunning`, or a persistence
    /// failure while recording a transition.
    pub async fn take_snapshot(&self, datasource_id: &str) -> Result<SnapshotMeta> {
        let start = Instant::now();
        log_op_start!("take_snapshot", datasource_id = datasource_id);

        let result = self.run(datasource_id).await;
        match &result {
            Ok(snapshot) => {
                log_op_end!(
                    "take_snapshot",
                    duration_ms = start.elapsed().as_millis() as u64,
                    snapshot_id = snapshot.id(),
                    status = snapshot.status().as_str(),
                    table_count = snapshot.tables().len()
                );
            }
            Err(e) => {
                log_op_error!(
                    "take_snapshot",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
            }
        }
        result
    }

    async fn run(&self, datasource_id: &str) -> Result<SnapshotMeta> {
        let datasource = self
            .datasources
            .get(datasource_id)?
            .ok_or_else(|| datasource_not_found("take_snapshot", datasource_id))?;

        let _claim = self.claim(datasource.id())?;
        if self.snapshots.find_running(datasource.id())?.is_some() {
            return Err(snapshot_already_running("take_snapshot", datasource.id()));
        }

        let now = self.clock.now();
        let date = now.date_naive();
        let mut snapshot =
            SnapshotMeta::start(&datasource, SnapshotKind::for_date(date), date, now);
        self.snapshots.save(&snapshot)?;

        match self.extract(&datasource, &mut snapshot).await {
            Ok(()) => {
                snapshot
                    .complete(self.clock.now())
                    .map_err(ExError::from)?;
                self.snapshots.save(&snapshot)?;

                if let Err(e) = self.retention.enforce(&datasource).await {
                    tracing::warn!(
                        datasource_id = datasource.id(),
                        error = %e,
                        "Retention enforcement failed after snapshot"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    datasource_id = datasource.id(),
                    snapshot_id = snapshot.id(),
                    tables_written = snapshot.tables().len(),
                    error = %e,
                    "Snapshot failed"
                );
                snapshot
                    .fail(e.to_string(), self.clock.now())
                    .map_err(ExError::from)?;
                self.snapshots.save(&snapshot)?;
            }
        }

        Ok(snapshot)
    }

    async fn extract(&self, datasource: &Datasource, snapshot: &mut SnapshotMeta) -> Result<()> {
        let password = self
            .cipher
            .unseal(datasource.connection().password.expose())
            .map_err(ExError::from)?;
        let target = ConnectionTarget::new(datasource.connection(), Sensitive::new(password));
        let dialect = self.dialects.get(datasource.source_type())?;
        let mut conn = dialect.connect(&target).await?;

        for schema in datasource.schemas() {
            let tables = conn.list_tables(schema).await?;
            for table in tables
                .iter()
                .filter(|t| datasource.includes_table(schema, t))
            {
                let primary_keys = conn.primary_keys(schema, table).await?;
                let file = conn.export_table(schema, table).await?;
                let storage_key = snapshot.table_key(schema, table);
                let byte_size = file.bytes.len() as u64;

                self.storage.write(&storage_key, file.bytes).await?;
                tracing::debug!(
                    snapshot_id = snapshot.id(),
                    storage_key = %storage_key,
                    row_count = file.row_count,
                    bytes = byte_size,
                    "Wrote table"
                );

                snapshot
                    .add_table(TableMeta {
                        schema: schema.clone(),
                        table: table.clone(),
                        row_count: file.row_count,
                        byte_size,
                        storage_key,
                        primary_keys,
                    })
                    .map_err(ExError::from)?;
                self.snapshots.save(snapshot)?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SnapshotTrigger for SnapshotOrchestrator {
    async fn trigger(&self, datasource_id: &str) {
        // Outcome is already logged by take_snapshot
        let _ = self.take_snapshot(datasource_id).await;
    }
}
