mod common;

use chrono::{Duration, NaiveDate};
use common::{at, Fixture};
use snaplake_core::model::{Datasource, SnapshotKind, SnapshotMeta, SnapshotStatus};
use snaplake_engine::recovery::{INTERRUPTED_MESSAGE, STALE_MESSAGE};
use snaplake_engine::RecoverySweep;
use snaplake_store::repo::SnapshotRepository;
use std::sync::Arc;

fn running(fx: &Fixture, ds: &Datasource, started_hour: u32) -> SnapshotMeta {
    let snapshot = SnapshotMeta::start(
        ds,
        SnapshotKind::Daily,
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        at(2024, 3, 9, started_hour),
    );
    fx.snapshots.save(&snapshot).unwrap();
    snapshot
}

fn sweep(fx: &Fixture, threshold_minutes: i64) -> RecoverySweep {
    RecoverySweep::new(
        fx.snapshots.clone(),
        fx.clock.clone(),
        Duration::minutes(threshold_minutes),
    )
}

#[test]
fn test_recover_all_fails_every_running_snapshot() {
    let fx = Fixture::new();
    let a = fx.save_datasource(fx.input("a"));
    let b = fx.save_datasource(fx.input("b"));
    let first = running(&fx, &a, 1);
    let second = running(&fx, &b, 2);

    let recovered = sweep(&fx, 180).recover_all().unwrap();

    assert_eq!(recovered, 2);
    assert!(fx.snapshots.list_running().unwrap().is_empty());
    for id in [first.id(), second.id()] {
        let snapshot = fx.snapshots.get(id).unwrap().unwrap();
        assert_eq!(snapshot.status(), SnapshotStatus::Failed);
        assert_eq!(snapshot.error_message(), Some(INTERRUPTED_MESSAGE));
        assert_eq!(snapshot.completed_at(), Some(at(2024, 3, 9, 2)));
    }

    // Nothing left to recover
    assert_eq!(sweep(&fx, 180).recover_all().unwrap(), 0);
}

#[test]
fn test_recover_all_leaves_finished_snapshots_alone() {
    let fx = Fixture::new();
    let ds = fx.save_datasource(fx.input("a"));
    let mut done = SnapshotMeta::start(
        &ds,
        SnapshotKind::Daily,
        NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
        at(2024, 3, 8, 2),
    );
    done.complete(at(2024, 3, 8, 3)).unwrap();
    fx.snapshots.save(&done).unwrap();

    assert_eq!(sweep(&fx, 180).recover_all().unwrap(), 0);
    let stored = fx.snapshots.get(done.id()).unwrap().unwrap();
    assert_eq!(stored.status(), SnapshotStatus::Completed);
}

#[test]
fn test_recover_stale_uses_threshold() {
    let fx = Fixture::new();
    fx.clock.set(at(2024, 3, 9, 6));
    let old_ds = fx.save_datasource(fx.input("old"));
    let fresh_ds = fx.save_datasource(fx.input("fresh"));
    // 5 hours old versus 1 hour old, against a 3 hour threshold
    let old = running(&fx, &old_ds, 1);
    let fresh = running(&fx, &fresh_ds, 5);

    let recovered = sweep(&fx, 180).recover_stale().unwrap();

    assert_eq!(recovered, 1);
    let old = fx.snapshots.get(old.id()).unwrap().unwrap();
    assert_eq!(old.status(), SnapshotStatus::Failed);
    assert_eq!(old.error_message(), Some(STALE_MESSAGE));
    let fresh = fx.snapshots.get(fresh.id()).unwrap().unwrap();
    assert!(fresh.is_running());

    // Once the fresh run ages past the threshold it is swept too
    fx.clock.set(at(2024, 3, 9, 9));
    assert_eq!(sweep(&fx, 180).recover_stale().unwrap(), 1);
    assert!(fx.snapshots.list_running().unwrap().is_empty());
}

#[tokio::test]
async fn test_periodic_sweep_runs_on_interval() {
    let fx = Fixture::new();
    fx.clock.set(at(2024, 3, 9, 12));
    let ds = fx.save_datasource(fx.input("orphan"));
    let orphan = running(&fx, &ds, 1);

    let handle = Arc::new(sweep(&fx, 60)).spawn_periodic(std::time::Duration::from_millis(50));

    let mut swept = false;
    for _ in 0..40 {
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        if !fx.snapshots.get(orphan.id()).unwrap().unwrap().is_running() {
            swept = true;
            break;
        }
    }
    handle.abort();
    assert!(swept, "periodic sweep never failed the stale snapshot");
}
