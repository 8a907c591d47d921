//! Datasource management
//!
//! Keeps the repository, the lake and the scheduler consistent: creation
//! seals the password and registers the schedule, enabling or disabling
//! reschedules, deletion unschedules and removes the datasource's files.

use snaplake_core::cipher::CredentialCipher;
use snaplake_core::clock::Clock;
use snaplake_core::errors::ExError;
use snaplake_core::model::{Datasource, NewDatasource};
use snaplake_core::{log_op_end, log_op_error, log_op_start};
use snaplake_core_types::Sensitive;
use snaplake_store::lake::StorageProvider;
use snaplake_store::repo::{DatasourceRepository, SnapshotRepository};
use std::sync::Arc;
use std::time::Instant;

use crate::dialect::{ConnectionCheck, ConnectionTarget, DialectRegistry};
use crate::errors::{datasource_not_found, snapshot_already_running, Result};
use crate::scheduler::Scheduler;

pub struct DatasourceService {
    datasources: Arc<dyn DatasourceRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    storage: Arc<dyn StorageProvider>,
    cipher: Arc<CredentialCipher>,
    dialects: Arc<DialectRegistry>,
    scheduler: Option<Arc<Scheduler>>,
    clock: Arc<dyn Clock>,
}

impl DatasourceService {
    pub fn new(
        datasources: Arc<dyn DatasourceRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        storage: Arc<dyn StorageProvider>,
        cipher: Arc<CredentialCipher>,
        dialects: Arc<DialectRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            datasources,
            snapshots,
            storage,
            cipher,
            dialects,
            scheduler: None,
            clock,
        }
    }

    /// Keep `scheduler` in step with datasource changes
    pub fn with_scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    fn load(&self, op: &str, id: &str) -> Result<Datasource> {
        self.datasources
            .get(id)?
            .ok_or_else(|| datasource_not_found(op, id))
    }

    pub fn get(&self, id: &str) -> Result<Datasource> {
        self.load("get_datasource", id)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Datasource>> {
        self.datasources.find_by_name(name)
    }

    pub fn list(&self) -> Result<Vec<Datasource>> {
        self.datasources.list()
    }

    /// Validate, seal the plaintext `input.password`, persist and schedule
    ///
    /// # Errors
    /// `InvalidInput` for invariant violations, `AlreadyExists` for a
    /// duplicate name.
    pub fn create(&self, mut input: NewDatasource) -> Result<Datasource> {
        let start = Instant::now();
        log_op_start!("create_datasource", name = input.name.as_str());

        let result = (|| -> Result<Datasource> {
            let sealed = self
                .cipher
                .seal(input.password.expose())
                .map_err(ExError::from)?;
            input.password = Sensitive::new(sealed);
            let datasource = Datasource::create(input, self.clock.now()).map_err(ExError::from)?;
            self.datasources.save(&datasource)?;
            if let Some(scheduler) = &self.scheduler {
                scheduler.register(&datasource);
            }
            Ok(datasource)
        })();

        match &result {
            Ok(ds) => {
                log_op_end!(
                    "create_datasource",
                    duration_ms = start.elapsed().as_millis() as u64,
                    datasource_id = ds.id()
                );
            }
            Err(e) => {
                log_op_error!(
                    "create_datasource",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
            }
        }
        result
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Datasource> {
        let mut datasource = self.load("set_datasource_enabled", id)?;
        let now = self.clock.now();
        if enabled {
            datasource.enable(now);
        } else {
            datasource.disable(now);
        }
        self.datasources.save(&datasource)?;
        if let Some(scheduler) = &self.scheduler {
            scheduler.reschedule(&datasource);
        }
        Ok(datasource)
    }

    /// Remove the datasource, its lake files under `{name}/` and, by
    /// cascade, its snapshot metadata
    ///
    /// # Errors
    /// `SnapshotAlreadyRunning` while a run is in progress.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let start = Instant::now();
        log_op_start!("delete_datasource", datasource_id = id);

        let result = self.delete_inner(id).await;
        match &result {
            Ok(()) => {
                log_op_end!(
                    "delete_datasource",
                    duration_ms = start.elapsed().as_millis() as u64
                );
            }
            Err(e) => {
                log_op_error!(
                    "delete_datasource",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
            }
        }
        result
    }

    async fn delete_inner(&self, id: &str) -> Result<()> {
        let datasource = self.load("delete_datasource", id)?;
        if self.snapshots.find_running(id)?.is_some() {
            return Err(snapshot_already_running("delete_datasource", id));
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.unregister(id);
        }
        let removed = self
            .storage
            .delete_all(&format!("{}/", datasource.name()))
            .await?;
        tracing::debug!(datasource_id = id, removed, "Deleted datasource files");
        self.datasources.delete(id)?;
        Ok(())
    }

    /// Probe the source with the stored credentials
    pub async fn test_connection(&self, id: &str) -> Result<ConnectionCheck> {
        let datasource = self.load("test_datasource_connection", id)?;
        let password = self
            .cipher
            .unseal(datasource.connection().password.expose())
            .map_err(ExError::from)?;
        let dialect = self.dialects.get(datasource.source_type())?;
        let target = ConnectionTarget::new(datasource.connection(), Sensitive::new(password));
        Ok(dialect.test_connection(&target).await)
    }
}
