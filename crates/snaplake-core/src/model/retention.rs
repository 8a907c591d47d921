use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::snapshot::{SnapshotKind, SnapshotMeta};

/// Per-kind maximum snapshot counts. Zero disables pruning for that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub daily_max_count: u32,
    pub monthly_max_count: u32,
}

/// Snapshots selected for pruning, split by whether their storage objects
/// may be removed
#[derive(Debug, Default)]
pub struct RetentionPlan<'a> {
    /// Delete storage prefix, then metadata
    pub expire: Vec<&'a SnapshotMeta>,
    /// Storage prefix is shared with a retained snapshot: metadata only
    pub expire_metadata_only: Vec<&'a SnapshotMeta>,
}

impl RetentionPlan<'_> {
    pub fn is_empty(&self) -> bool {
        self.expire.is_empty() && self.expire_metadata_only.is_empty()
    }

    pub fn len(&self) -> usize {
        self.expire.len() + self.expire_metadata_only.len()
    }
}

impl RetentionPolicy {
    pub fn new(daily_max_count: u32, monthly_max_count: u32) -> Self {
        Self {
            daily_max_count,
            monthly_max_count,
        }
    }

    /// Maximum for a kind, `None` when unlimited
    pub fn max_for(&self, kind: SnapshotKind) -> Option<usize> {
        let max = match kind {
            SnapshotKind::Daily => self.daily_max_count,
            SnapshotKind::Monthly => self.monthly_max_count,
        };
        (max > 0).then_some(max as usize)
    }

    /// Choose which snapshots fall outside the retained window
    ///
    /// RUNNING snapshots are never considered. Within each kind the newest
    /// `max` snapshots by logical date (start time breaks ties) are kept.
    pub fn plan<'a>(&self, snapshots: &'a [SnapshotMeta]) -> RetentionPlan<'a> {
        let mut plan = RetentionPlan::default();

        for kind in [SnapshotKind::Daily, SnapshotKind::Monthly] {
            let Some(max) = self.max_for(kind) else {
                continue;
            };

            let mut of_kind: Vec<&SnapshotMeta> = snapshots
                .iter()
                .filter(|s| s.kind() == kind && !s.is_running())
                .collect();
            of_kind.sort_by(|a, b| {
                b.snapshot_date()
                    .cmp(&a.snapshot_date())
                    .then_with(|| b.started_at().cmp(&a.started_at()))
            });

            if of_kind.len() <= max {
                continue;
            }

            let (kept, expired) = of_kind.split_at(max);
            let mut live_prefixes: HashSet<String> =
                kept.iter().map(|s| s.storage_prefix()).collect();
            // A RUNNING snapshot of the same kind may be writing under a shared prefix
            live_prefixes.extend(
                snapshots
                    .iter()
                    .filter(|s| s.kind() == kind && s.is_running())
                    .map(|s| s.storage_prefix()),
            );

            for snapshot in expired {
                if live_prefixes.contains(&snapshot.storage_prefix()) {
                    plan.expire_metadata_only.push(snapshot);
                } else {
                    plan.expire.push(snapshot);
                }
            }
        }

        plan
    }
}
