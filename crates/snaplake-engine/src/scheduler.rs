//! Cron scheduler
//!
//! One tokio task per scheduled datasource. Each task sleeps until the next
//! cron fire time and awaits a full snapshot run before computing the next
//! one. Entries live only in memory and are rebuilt at process start.

use chrono::{DateTime, Utc};
use snaplake_core::model::Datasource;
use snaplake_core::rules::cron;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::snapshot::SnapshotTrigger;

/// Listing row for a scheduled datasource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub datasource_id: String,
    pub datasource_name: String,
    /// Normalized 6/7-field expression
    pub cron: String,
    /// Not tracked; always `None`
    pub next_run: Option<DateTime<Utc>>,
}

struct Entry {
    handle: JoinHandle<()>,
    datasource_name: String,
    cron: String,
}

pub struct Scheduler {
    trigger: Arc<dyn SnapshotTrigger>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Scheduler {
    pub fn new(trigger: Arc<dyn SnapshotTrigger>) -> Self {
        Self {
            trigger,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule `datasource`, replacing any existing entry
    ///
    /// Returns whether a timer is now running. A missing or invalid cron
    /// expression leaves the datasource unscheduled; the latter is logged.
    pub fn register(&self, datasource: &Datasource) -> bool {
        self.unregister(datasource.id());

        let Some(expression) = datasource.cron() else {
            return false;
        };
        let (normalized, schedule) = match cron::parse(expression) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    datasource_id = datasource.id(),
                    cron = expression,
                    error = %e,
                    "Invalid cron expression; datasource not scheduled"
                );
                return false;
            }
        };

        let trigger = self.trigger.clone();
        let datasource_id = datasource.id().to_string();
        let task_id = datasource_id.clone();
        let handle = tokio::spawn(async move {
            // Recomputed after every run so ticks missed by a long run are skipped
            while let Some(next) = schedule.upcoming(Utc).next() {
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                tracing::info!(datasource_id = %task_id, "Scheduled snapshot firing");
                trigger.trigger(&task_id).await;
            }
        });

        tracing::info!(
            datasource_id = %datasource_id,
            cron = %normalized,
            "Registered snapshot schedule"
        );
        self.entries().insert(
            datasource_id,
            Entry {
                handle,
                datasource_name: datasource.name().to_string(),
                cron: normalized,
            },
        );
        true
    }

    /// Cancel the timer for `datasource_id`; returns whether one existed
    pub fn unregister(&self, datasource_id: &str) -> bool {
        match self.entries().remove(datasource_id) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drop and, if enabled with a cron expression, re-register
    pub fn reschedule(&self, datasource: &Datasource) -> bool {
        self.unregister(datasource.id());
        if datasource.is_enabled() && datasource.cron().is_some() {
            self.register(datasource)
        } else {
            false
        }
    }

    /// Sorted by datasource name
    pub fn list_scheduled(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self
            .entries()
            .iter()
            .map(|(id, entry)| ScheduledTask {
                datasource_id: id.clone(),
                datasource_name: entry.datasource_name.clone(),
                cron: entry.cron.clone(),
                next_run: None,
            })
            .collect();
        tasks.sort_by(|a, b| a.datasource_name.cmp(&b.datasource_name));
        tasks
    }

    /// Replace every entry with the enabled subset of `datasources`
    pub fn rebuild(&self, datasources: &[Datasource]) -> usize {
        self.shutdown();
        datasources
            .iter()
            .filter(|ds| ds.is_enabled())
            .filter(|ds| self.register(ds))
            .count()
    }

    pub fn shutdown(&self) {
        for (_, entry) in self.entries().drain() {
            entry.handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
