mod common;

use chrono::NaiveDate;
use common::{at, Fixture};
use snaplake_core::errors::ExErrorKind;
use snaplake_core::is_sealed;
use snaplake_core::model::{SnapshotKind, SnapshotMeta};
use snaplake_core_types::Sensitive;
use snaplake_engine::dialect::DialectRegistry;
use snaplake_engine::{DatasourceService, Scheduler};
use snaplake_store::lake::StorageProvider;
use snaplake_store::repo::SnapshotRepository;
use std::sync::Arc;

fn service(fx: &Fixture) -> (DatasourceService, Arc<Scheduler>) {
    let scheduler = Arc::new(Scheduler::new(Arc::new(fx.orchestrator())));
    let service = DatasourceService::new(
        fx.datasources.clone(),
        fx.snapshots.clone(),
        fx.storage.clone(),
        fx.cipher.clone(),
        Arc::new(DialectRegistry::with_defaults()),
        fx.clock.clone(),
    )
    .with_scheduler(scheduler.clone());
    (service, scheduler)
}

#[tokio::test]
async fn test_create_seals_password_and_schedules() {
    let fx = Fixture::new();
    let (service, scheduler) = service(&fx);
    let mut input = fx.input("shop");
    input.password = Sensitive::from("hunter2");
    input.cron = Some("0 2 * * *".to_string());

    let ds = service.create(input).unwrap();

    let stored = service.get(ds.id()).unwrap();
    let sealed = stored.connection().password.expose();
    assert!(is_sealed(sealed));
    assert_eq!(fx.cipher.unseal(sealed).unwrap(), "hunter2");

    let tasks = scheduler.list_scheduled();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].datasource_id, ds.id());
}

#[tokio::test]
async fn test_create_validates_and_rejects_duplicates() {
    let fx = Fixture::new();
    let (service, _) = service(&fx);

    let mut bad = fx.input("../escape");
    bad.cron = None;
    assert_eq!(
        service.create(bad).unwrap_err().kind(),
        ExErrorKind::InvalidInput
    );

    let mut bad_cron = fx.input("shop");
    bad_cron.cron = Some("not a cron".to_string());
    assert_eq!(
        service.create(bad_cron).unwrap_err().kind(),
        ExErrorKind::InvalidCron
    );

    service.create(fx.input("shop")).unwrap();
    assert_eq!(
        service.create(fx.input("shop")).unwrap_err().kind(),
        ExErrorKind::AlreadyExists
    );
    assert_eq!(service.list().unwrap().len(), 1);
    assert!(service.find_by_name("shop").unwrap().is_some());
}

#[tokio::test]
async fn test_set_enabled_reschedules() {
    let fx = Fixture::new();
    let (service, scheduler) = service(&fx);
    let mut input = fx.input("shop");
    input.cron = Some("0 2 * * *".to_string());
    let ds = service.create(input).unwrap();

    let disabled = service.set_enabled(ds.id(), false).unwrap();
    assert!(!disabled.is_enabled());
    assert!(!service.get(ds.id()).unwrap().is_enabled());
    assert!(scheduler.list_scheduled().is_empty());

    service.set_enabled(ds.id(), true).unwrap();
    assert_eq!(scheduler.list_scheduled().len(), 1);

    let err = service.set_enabled("missing", true).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::DatasourceNotFound);
}

#[tokio::test]
async fn test_delete_removes_files_snapshots_and_schedule() {
    let fx = Fixture::new();
    let (service, scheduler) = service(&fx);
    let mut input = fx.input("shop");
    input.cron = Some("0 2 * * *".to_string());
    let ds = service.create(input).unwrap();
    let other = service.create(fx.input("shopfront")).unwrap();

    let orchestrator = fx.orchestrator();
    let snapshot = orchestrator.take_snapshot(ds.id()).await.unwrap();
    let kept = orchestrator.take_snapshot(other.id()).await.unwrap();

    service.delete(ds.id()).await.unwrap();

    assert_eq!(
        service.get(ds.id()).unwrap_err().kind(),
        ExErrorKind::DatasourceNotFound
    );
    assert!(fx.snapshots.get(snapshot.id()).unwrap().is_none());
    assert!(fx.storage.list("shop/").await.unwrap().is_empty());
    assert!(scheduler.list_scheduled().is_empty());

    // A datasource whose name merely starts with the same letters is untouched
    assert!(fx.snapshots.get(kept.id()).unwrap().is_some());
    assert_eq!(fx.storage.list("shopfront/").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_refused_while_running() {
    let fx = Fixture::new();
    let (service, _) = service(&fx);
    let ds = service.create(fx.input("shop")).unwrap();
    let running = SnapshotMeta::start(
        &ds,
        SnapshotKind::Daily,
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        at(2024, 3, 9, 2),
    );
    fx.snapshots.save(&running).unwrap();

    let err = service.delete(ds.id()).await.unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::SnapshotAlreadyRunning);
    assert!(service.get(ds.id()).is_ok());
}

#[tokio::test]
async fn test_connection_probe() {
    let fx = Fixture::new();
    let (service, _) = service(&fx);
    let ok = service.create(fx.input("shop")).unwrap();
    let mut missing = fx.input("missing");
    missing.database = fx.dir.path().join("absent.db").to_string_lossy().into_owned();
    let missing = service.create(missing).unwrap();

    let check = service.test_connection(ok.id()).await.unwrap();
    assert!(check.success, "{}", check.message);

    let check = service.test_connection(missing.id()).await.unwrap();
    assert!(!check.success);
    assert!(check.message.contains("does not exist"));
}
