//! Background supervisor
//!
//! `start` runs the startup sequence in order (credential migration, startup
//! recovery, schedule rebuild) and spawns the periodic stale sweep.
//! `shutdown` cancels every timer and background task it owns.

use snaplake_core::cipher::CredentialCipher;
use snaplake_core::{log_op_end, log_op_error, log_op_start};
use snaplake_store::credentials::migrate_credentials;
use snaplake_store::repo::DatasourceRepository;
use snaplake_store::Database;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::errors::Result;
use crate::recovery::RecoverySweep;
use crate::scheduler::Scheduler;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    pub sealed_credentials: usize,
    pub recovered: usize,
    pub scheduled: usize,
}

pub struct Supervisor {
    db: Database,
    cipher: Arc<CredentialCipher>,
    datasources: Arc<dyn DatasourceRepository>,
    scheduler: Arc<Scheduler>,
    recovery: Arc<RecoverySweep>,
    recovery_interval: Duration,
    scheduler_enabled: bool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(
        db: Database,
        cipher: Arc<CredentialCipher>,
        datasources: Arc<dyn DatasourceRepository>,
        scheduler: Arc<Scheduler>,
        recovery: Arc<RecoverySweep>,
        recovery_interval: Duration,
    ) -> Self {
        Self {
            db,
            cipher,
            datasources,
            scheduler,
            recovery,
            recovery_interval,
            scheduler_enabled: true,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Skip schedule rebuild (one-shot commands)
    pub fn without_scheduler(mut self) -> Self {
        self.scheduler_enabled = false;
        self
    }

    /// Must be called from within a tokio runtime
    pub fn start(&self) -> Result<StartupReport> {
        let start = Instant::now();
        log_op_start!("supervisor_start");

        let result = self.start_inner();
        match &result {
            Ok(report) => {
                log_op_end!(
                    "supervisor_start",
                    duration_ms = start.elapsed().as_millis() as u64,
                    sealed_credentials = report.sealed_credentials,
                    recovered = report.recovered,
                    scheduled = report.scheduled
                );
            }
            Err(e) => {
                log_op_error!(
                    "supervisor_start",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
            }
        }
        result
    }

    fn start_inner(&self) -> Result<StartupReport> {
        let sealed = migrate_credentials(&self.db, &self.cipher)?;
        let recovered = self.recovery.recover_all()?;
        let scheduled = if self.scheduler_enabled {
            self.scheduler.rebuild(&self.datasources.list_enabled()?)
        } else {
            0
        };

        let sweep = self.recovery.clone().spawn_periodic(self.recovery_interval);
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sweep);

        Ok(StartupReport {
            sealed_credentials: sealed.total(),
            recovered,
            scheduled,
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        for handle in self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            handle.abort();
        }
        tracing::info!("Supervisor stopped");
    }
}
