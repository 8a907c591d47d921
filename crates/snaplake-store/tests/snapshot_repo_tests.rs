mod common;

use chrono::{Duration, NaiveDate};
use snaplake_core::errors::ExErrorKind;
use snaplake_core::model::{SnapshotStatus, TableMeta};
use snaplake_store::repo::{DatasourceRepository, SnapshotRepository};
use snaplake_store::Database;

fn table(name: &str, rows: u64) -> TableMeta {
    TableMeta {
        schema: "public".to_string(),
        table: name.to_string(),
        row_count: rows,
        byte_size: 512,
        storage_key: format!("shop/daily/2024-03-09/public.{}.parquet", name),
        primary_keys: vec!["tenant_id".to_string(), "id".to_string()],
    }
}

#[test]
fn test_save_persists_tables_in_order() {
    let db = Database::open_in_memory().unwrap();
    let (ds_repo, repo) = common::repos(&db);
    let ds = common::new_datasource("shop");
    ds_repo.save(&ds).unwrap();

    let mut snap = common::running_snapshot(&ds, 9, 2);
    repo.save(&snap).unwrap();
    snap.add_table(table("orders", 10)).unwrap();
    repo.save(&snap).unwrap();
    snap.add_table(table("customers", 4)).unwrap();
    snap.complete(snap.started_at() + Duration::minutes(2)).unwrap();
    repo.save(&snap).unwrap();

    let loaded = repo.get(snap.id()).unwrap().unwrap();
    assert_eq!(loaded, snap);
    assert_eq!(loaded.tables()[1].primary_keys, vec!["tenant_id", "id"]);
}

#[test]
fn test_find_running_and_list_running() {
    let db = Database::open_in_memory().unwrap();
    let (ds_repo, repo) = common::repos(&db);
    let ds = common::new_datasource("shop");
    ds_repo.save(&ds).unwrap();

    assert!(repo.find_running(ds.id()).unwrap().is_none());

    let snap = common::running_snapshot(&ds, 9, 2);
    repo.save(&snap).unwrap();

    assert_eq!(repo.find_running(ds.id()).unwrap().unwrap().id(), snap.id());
    assert_eq!(repo.list_running().unwrap().len(), 1);
}

#[test]
fn test_second_running_snapshot_rejected() {
    let db = Database::open_in_memory().unwrap();
    let (ds_repo, repo) = common::repos(&db);
    let ds = common::new_datasource("shop");
    ds_repo.save(&ds).unwrap();

    repo.save(&common::running_snapshot(&ds, 9, 2)).unwrap();
    let err = repo.save(&common::running_snapshot(&ds, 9, 3)).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::SnapshotAlreadyRunning);
}

#[test]
fn test_list_by_datasource_newest_first() {
    let db = Database::open_in_memory().unwrap();
    let (ds_repo, repo) = common::repos(&db);
    let ds = common::new_datasource("shop");
    ds_repo.save(&ds).unwrap();

    for (day, hour) in [(3, 2), (9, 2), (9, 5), (5, 2)] {
        let mut snap = common::running_snapshot(&ds, day, hour);
        snap.complete(snap.started_at()).unwrap();
        repo.save(&snap).unwrap();
    }

    let order: Vec<_> = repo
        .list_by_datasource(ds.id())
        .unwrap()
        .iter()
        .map(|s| (s.snapshot_date().to_string(), s.started_at().format("%H").to_string()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("2024-03-09".to_string(), "05".to_string()),
            ("2024-03-09".to_string(), "02".to_string()),
            ("2024-03-05".to_string(), "02".to_string()),
            ("2024-03-03".to_string(), "02".to_string()),
        ]
    );
}

#[test]
fn test_find_completed_on_ignores_failed() {
    let db = Database::open_in_memory().unwrap();
    let (ds_repo, repo) = common::repos(&db);
    let ds = common::new_datasource("shop");
    ds_repo.save(&ds).unwrap();

    let mut ok = common::running_snapshot(&ds, 9, 2);
    ok.complete(ok.started_at()).unwrap();
    repo.save(&ok).unwrap();
    let mut failed = common::running_snapshot(&ds, 9, 6);
    failed.fail("boom", failed.started_at()).unwrap();
    repo.save(&failed).unwrap();

    let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    let found = repo.find_completed_on(ds.id(), date).unwrap().unwrap();
    assert_eq!(found.id(), ok.id());
    assert_eq!(found.status(), SnapshotStatus::Completed);
}

#[test]
fn test_deleting_datasource_cascades() {
    let db = Database::open_in_memory().unwrap();
    let (ds_repo, repo) = common::repos(&db);
    let ds = common::new_datasource("shop");
    ds_repo.save(&ds).unwrap();
    let mut snap = common::running_snapshot(&ds, 9, 2);
    snap.add_table(table("orders", 1)).unwrap();
    repo.save(&snap).unwrap();

    ds_repo.delete(ds.id()).unwrap();

    assert!(repo.get(snap.id()).unwrap().is_none());
}
