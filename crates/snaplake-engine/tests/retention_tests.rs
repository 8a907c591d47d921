mod common;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{at, seed_completed, Fixture};
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::{RetentionPolicy, SnapshotKind, SnapshotMeta};
use snaplake_engine::errors::Result;
use snaplake_engine::RetentionEnforcer;
use snaplake_store::lake::StorageProvider;
use snaplake_store::repo::SnapshotRepository;
use std::sync::Arc;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

/// Storage whose deletes always fail
struct FailingDeletes;

#[async_trait]
impl StorageProvider for FailingDeletes {
    async fn write(&self, _key: &str, _bytes: Vec<u8>) -> Result<()> {
        Ok(())
    }
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        Err(ExError::new(ExErrorKind::NotFound).with_entity_id(key))
    }
    async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn delete(&self, _key: &str) -> Result<()> {
        Err(ExError::new(ExErrorKind::Io).with_message("disk gone"))
    }
    async fn delete_all(&self, _prefix: &str) -> Result<usize> {
        Err(ExError::new(ExErrorKind::Io).with_message("disk gone"))
    }
    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
    async fn get_uri(&self, key: &str) -> Result<String> {
        Ok(key.to_string())
    }
    async fn test_connection(&self) -> bool {
        false
    }
}

fn ids(snapshots: &[SnapshotMeta]) -> Vec<String> {
    let mut ids: Vec<String> = snapshots.iter().map(|s| s.id().to_string()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_keeps_newest_dailies() {
    let fx = Fixture::new();
    let mut input = fx.input("shop");
    input.retention = RetentionPolicy::new(3, 0);
    let ds = fx.save_datasource(input);

    let mut seeded = Vec::new();
    for d in 3..=7 {
        seeded.push(
            seed_completed(
                fx.snapshots.as_ref(),
                fx.storage.as_ref(),
                &ds,
                SnapshotKind::Daily,
                day(d),
                at(2024, 3, d, 2),
            )
            .await,
        );
    }

    let enforcer = RetentionEnforcer::new(fx.snapshots.clone(), fx.storage.clone());
    let report = enforcer.enforce(&ds).await.unwrap();

    let mut expected_deleted = vec![seeded[0].id().to_string(), seeded[1].id().to_string()];
    expected_deleted.sort();
    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, expected_deleted);
    assert!(report.failed.is_empty());

    let remaining = fx.snapshots.list_by_datasource(ds.id()).unwrap();
    assert_eq!(ids(&remaining), ids(&seeded[2..]));

    for gone in &seeded[..2] {
        assert!(fx.storage.list(&gone.storage_prefix()).await.unwrap().is_empty());
    }
    for kept in &seeded[2..] {
        assert_eq!(fx.storage.list(&kept.storage_prefix()).await.unwrap().len(), 1);
    }

    // A second pass has nothing left to do
    let again = enforcer.enforce(&ds).await.unwrap();
    assert!(again.deleted.is_empty());
}

#[tokio::test]
async fn test_kinds_are_pruned_independently() {
    let fx = Fixture::new();
    let mut input = fx.input("shop");
    input.retention = RetentionPolicy::new(1, 0);
    let ds = fx.save_datasource(input);

    let monthly = seed_completed(
        fx.snapshots.as_ref(),
        fx.storage.as_ref(),
        &ds,
        SnapshotKind::Monthly,
        day(1),
        at(2024, 3, 1, 2),
    )
    .await;
    for d in [2, 3] {
        seed_completed(
            fx.snapshots.as_ref(),
            fx.storage.as_ref(),
            &ds,
            SnapshotKind::Daily,
            day(d),
            at(2024, 3, d, 2),
        )
        .await;
    }

    let report = RetentionEnforcer::new(fx.snapshots.clone(), fx.storage.clone())
        .enforce(&ds)
        .await
        .unwrap();

    assert_eq!(report.deleted.len(), 1);
    let remaining = fx.snapshots.list_by_datasource(ds.id()).unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().any(|s| s.id() == monthly.id()));
    assert!(remaining.iter().any(|s| s.snapshot_date() == day(3)));
}

#[tokio::test]
async fn test_storage_failure_keeps_metadata() {
    let fx = Fixture::new();
    let mut input = fx.input("shop");
    input.retention = RetentionPolicy::new(1, 0);
    let ds = fx.save_datasource(input);

    let old = seed_completed(
        fx.snapshots.as_ref(),
        fx.storage.as_ref(),
        &ds,
        SnapshotKind::Daily,
        day(4),
        at(2024, 3, 4, 2),
    )
    .await;
    seed_completed(
        fx.snapshots.as_ref(),
        fx.storage.as_ref(),
        &ds,
        SnapshotKind::Daily,
        day(5),
        at(2024, 3, 5, 2),
    )
    .await;

    let report = RetentionEnforcer::new(fx.snapshots.clone(), Arc::new(FailingDeletes))
        .enforce(&ds)
        .await
        .unwrap();

    assert!(report.deleted.is_empty());
    assert_eq!(report.failed, vec![old.id().to_string()]);
    assert!(fx.snapshots.get(old.id()).unwrap().is_some());
}

#[tokio::test]
async fn test_shared_prefix_removes_metadata_only() {
    let fx = Fixture::new();
    let mut input = fx.input("shop");
    input.retention = RetentionPolicy::new(1, 0);
    let ds = fx.save_datasource(input);

    // Two runs on the same logical day write under the same prefix
    let earlier = seed_completed(
        fx.snapshots.as_ref(),
        fx.storage.as_ref(),
        &ds,
        SnapshotKind::Daily,
        day(6),
        at(2024, 3, 6, 1),
    )
    .await;
    let later = seed_completed(
        fx.snapshots.as_ref(),
        fx.storage.as_ref(),
        &ds,
        SnapshotKind::Daily,
        day(6),
        at(2024, 3, 6, 5),
    )
    .await;

    let report = RetentionEnforcer::new(fx.snapshots.clone(), fx.storage.clone())
        .enforce(&ds)
        .await
        .unwrap();

    assert_eq!(report.deleted, vec![earlier.id().to_string()]);
    assert!(fx.snapshots.get(earlier.id()).unwrap().is_none());
    assert!(fx.snapshots.get(later.id()).unwrap().is_some());
    assert!(fx
        .storage
        .exists(&later.tables()[0].storage_key)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unlimited_policy_is_noop() {
    let fx = Fixture::new();
    let ds = fx.save_datasource(fx.input("shop"));
    for d in 1..=4 {
        seed_completed(
            fx.snapshots.as_ref(),
            fx.storage.as_ref(),
            &ds,
            SnapshotKind::for_date(day(d)),
            day(d),
            at(2024, 3, d, 2),
        )
        .await;
    }

    let report = RetentionEnforcer::new(fx.snapshots.clone(), fx.storage.clone())
        .enforce(&ds)
        .await
        .unwrap();

    assert!(report.deleted.is_empty());
    assert_eq!(fx.snapshots.list_by_datasource(ds.id()).unwrap().len(), 4);
}
