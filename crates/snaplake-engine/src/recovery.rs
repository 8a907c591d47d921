//! Recovery of orphaned RUNNING snapshots
//!
//! A process that dies mid-run leaves its snapshot RUNNING forever, which
//! would also block every later run of that datasource. `recover_all` runs at
//! startup; `recover_stale` runs periodically.
//!
//! Known limitation: a legitimate run that outlives the stale threshold is
//! marked FAILED.

use chrono::Duration;
use snaplake_core::clock::Clock;
use snaplake_core::errors::ExError;
use snaplake_core::model::SnapshotMeta;
use snaplake_core::{log_op_end, log_op_error, log_op_start};
use snaplake_store::repo::SnapshotRepository;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::errors::Result;

pub const INTERRUPTED_MESSAGE: &str = "Snapshot interrupted: process stopped before completion";
pub const STALE_MESSAGE: &str = "Snapshot exceeded the stale threshold and was marked failed";

pub struct RecoverySweep {
    snapshots: Arc<dyn SnapshotRepository>,
    clock: Arc<dyn Clock>,
    stale_threshold: Duration,
}

impl RecoverySweep {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        clock: Arc<dyn Clock>,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            snapshots,
            clock,
            stale_threshold,
        }
    }

    /// Fail every RUNNING snapshot. Call only before any run can start.
    pub fn recover_all(&self) -> Result<usize> {
        self.sweep("recover_all", INTERRUPTED_MESSAGE, |_| true)
    }

    /// Fail RUNNING snapshots started before `now - stale_threshold`
    pub fn recover_stale(&self) -> Result<usize> {
        let cutoff = self.clock.now() - self.stale_threshold;
        self.sweep("recover_stale", STALE_MESSAGE, |s| s.started_at() < cutoff)
    }

    fn sweep(
        &self,
        op: &'static str,
        message: &str,
        select: impl Fn(&SnapshotMeta) -> bool,
    ) -> Result<usize> {
        let start = Instant::now();
        log_op_start!(op);

        let result = (|| -> Result<usize> {
            let mut recovered = 0;
            for mut snapshot in self.snapshots.list_running()? {
                if !select(&snapshot) {
                    continue;
                }
                snapshot
                    .fail(message, self.clock.now())
                    .map_err(ExError::from)?;
                self.snapshots.save(&snapshot)?;
                tracing::warn!(
                    snapshot_id = snapshot.id(),
                    datasource_id = snapshot.datasource_id(),
                    started_at = %snapshot.started_at(),
                    "Marked orphaned snapshot FAILED"
                );
                recovered += 1;
            }
            Ok(recovered)
        })();

        match &result {
            Ok(recovered) => {
                log_op_end!(
                    op,
                    duration_ms = start.elapsed().as_millis() as u64,
                    recovered = *recovered
                );
            }
            Err(e) => {
                log_op_error!(op, e.clone(), duration_ms = start.elapsed().as_millis() as u64);
            }
        }
        result
    }

    /// Run `recover_stale` every `interval` until the handle is aborted
    pub fn spawn_periodic(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; startup already ran recover_all
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.recover_stale() {
                    tracing::warn!(error = %e, "Stale snapshot sweep failed");
                }
            }
        })
    }
}
