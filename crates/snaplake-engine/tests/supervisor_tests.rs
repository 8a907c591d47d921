mod common;

use chrono::NaiveDate;
use common::{at, Fixture};
use snaplake_core::is_sealed;
use snaplake_core::model::{SnapshotKind, SnapshotMeta, SnapshotStatus};
use snaplake_core_types::Sensitive;
use snaplake_engine::recovery::INTERRUPTED_MESSAGE;
use snaplake_engine::{RecoverySweep, Scheduler, Supervisor};
use snaplake_store::repo::{DatasourceRepository, SnapshotRepository};
use std::sync::Arc;
use std::time::Duration;

fn supervisor(fx: &Fixture) -> Supervisor {
    let scheduler = Arc::new(Scheduler::new(Arc::new(fx.orchestrator())));
    let recovery = Arc::new(RecoverySweep::new(
        fx.snapshots.clone(),
        fx.clock.clone(),
        chrono::Duration::minutes(180),
    ));
    Supervisor::new(
        fx.db.clone(),
        fx.cipher.clone(),
        fx.datasources.clone(),
        scheduler,
        recovery,
        Duration::from_secs(300),
    )
}

/// Legacy plaintext password, a cron schedule and an orphaned run
fn seed(fx: &Fixture) -> (String, SnapshotMeta) {
    let mut input = fx.input("legacy");
    input.password = Sensitive::from("plaintext-pw");
    input.cron = Some("0 2 * * *".to_string());
    let ds = fx.save_datasource(input);

    let mut off = fx.input("paused");
    off.cron = Some("0 3 * * *".to_string());
    let mut paused = fx.save_datasource(off);
    paused.disable(at(2024, 3, 9, 0));
    fx.datasources.save(&paused).unwrap();

    let orphan = SnapshotMeta::start(
        &ds,
        SnapshotKind::Daily,
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        at(2024, 3, 9, 1),
    );
    fx.snapshots.save(&orphan).unwrap();
    (ds.id().to_string(), orphan)
}

#[tokio::test]
async fn test_startup_sequence() {
    let fx = Fixture::new();
    let (ds_id, orphan) = seed(&fx);
    let supervisor = supervisor(&fx);

    let report = supervisor.start().unwrap();

    assert_eq!(report.sealed_credentials, 1);
    assert_eq!(report.recovered, 1);
    assert_eq!(report.scheduled, 1);

    let ds = fx.datasources.get(&ds_id).unwrap().unwrap();
    let stored = ds.connection().password.expose();
    assert!(is_sealed(stored));
    assert_eq!(fx.cipher.unseal(stored).unwrap(), "plaintext-pw");

    let orphan = fx.snapshots.get(orphan.id()).unwrap().unwrap();
    assert_eq!(orphan.status(), SnapshotStatus::Failed);
    assert_eq!(orphan.error_message(), Some(INTERRUPTED_MESSAGE));

    let tasks = supervisor.scheduler().list_scheduled();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].datasource_name, "legacy");

    supervisor.shutdown();
    assert!(supervisor.scheduler().list_scheduled().is_empty());
}

#[tokio::test]
async fn test_second_start_has_nothing_to_repair() {
    let fx = Fixture::new();
    seed(&fx);
    let supervisor = supervisor(&fx);
    supervisor.start().unwrap();
    supervisor.shutdown();

    let report = supervisor.start().unwrap();
    assert_eq!(report.sealed_credentials, 0);
    assert_eq!(report.recovered, 0);
    assert_eq!(report.scheduled, 1);
    supervisor.shutdown();
}

#[tokio::test]
async fn test_without_scheduler_skips_rebuild() {
    let fx = Fixture::new();
    seed(&fx);
    let supervisor = supervisor(&fx).without_scheduler();

    let report = supervisor.start().unwrap();

    assert_eq!(report.scheduled, 0);
    assert_eq!(report.recovered, 1);
    assert!(supervisor.scheduler().list_scheduled().is_empty());
    supervisor.shutdown();
}
