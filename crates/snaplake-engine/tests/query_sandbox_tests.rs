mod common;

use common::{at, Fixture};
use serde_json::json;
use snaplake_core::errors::ExErrorKind;
use snaplake_core::model::{SnapshotKind, SnapshotMeta};
use snaplake_engine::{QueryRequest, QuerySandbox, SnapshotSelection, SnapshotViews};
use snaplake_store::lake::StorageProvider;
use std::sync::Arc;

struct Lake {
    fx: Fixture,
    before: SnapshotMeta,
    after: SnapshotMeta,
}

/// Two snapshots a day apart with one customer added in between
async fn lake() -> Lake {
    let fx = Fixture::new();
    let ds = fx.save_datasource(fx.input("shop"));
    let orchestrator = fx.orchestrator();

    fx.clock.set(at(2024, 3, 8, 2));
    let before = orchestrator.take_snapshot(ds.id()).await.unwrap();

    let conn = rusqlite::Connection::open(&fx.source_path).unwrap();
    conn.execute(
        "INSERT INTO customers VALUES (4, 'dennis', 99.0)",
        [],
    )
    .unwrap();
    drop(conn);

    fx.clock.set(at(2024, 3, 9, 2));
    let after = orchestrator.take_snapshot(ds.id()).await.unwrap();

    Lake { fx, before, after }
}

fn sandbox(lake: &Lake) -> QuerySandbox {
    QuerySandbox::new(lake.fx.cipher.clone())
}

async fn views(lake: &Lake) -> Vec<String> {
    SnapshotViews::statements(
        &[
            SnapshotSelection::new("mar08", lake.before.clone()),
            SnapshotSelection::new("mar09", lake.after.clone()),
        ],
        lake.fx.storage.as_ref(),
    )
    .await
    .unwrap()
}

async fn customers_uri(lake: &Lake) -> String {
    let key = lake.after.table_key("main", "customers");
    lake.fx.storage.get_uri(&key).await.unwrap()
}

#[tokio::test]
async fn test_view_statements_per_alias() {
    let lake = lake().await;
    let statements = views(&lake).await;

    assert_eq!(statements.len(), 6);
    assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS \"mar08\"");
    assert!(statements[1].starts_with("CREATE OR REPLACE VIEW \"mar08\".\"customers\" AS SELECT * FROM read_parquet('"));
    assert!(statements[1].ends_with("shop/daily/2024-03-08/main.customers.parquet')"));
    assert_eq!(statements[3], "CREATE SCHEMA IF NOT EXISTS \"mar09\"");
    assert!(statements[5].contains("\"mar09\".\"orders\""));
}

#[tokio::test]
async fn test_query_compares_two_snapshots() {
    let lake = lake().await;
    let mut request = QueryRequest::new(
        "SELECT c.name FROM mar09.customers c \
         LEFT JOIN mar08.customers p ON c.id = p.id \
         WHERE p.id IS NULL",
    );
    request.view_setup = views(&lake).await;

    let result = sandbox(&lake).execute_query(request).await.unwrap();

    assert_eq!(result.columns.len(), 1);
    assert_eq!(result.columns[0].name, "name");
    assert_eq!(result.rows, vec![vec![json!("dennis")]]);
    assert_eq!(result.total_rows, 1);
}

#[tokio::test]
async fn test_query_pages_and_counts() {
    let lake = lake().await;
    let sandbox = sandbox(&lake);

    let mut full = QueryRequest::new("SELECT id, balance FROM mar09.customers ORDER BY id");
    full.view_setup = views(&lake).await;
    let result = sandbox.execute_query(full.clone()).await.unwrap();
    assert_eq!(result.total_rows, 4);
    let mut ids: Vec<i64> = result.rows.iter().map(|r| r[0].as_i64().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(result.rows.iter().any(|r| r[1].is_null()));
    assert!(result.rows.iter().any(|r| r[1] == json!(10.5)));

    let mut page = full;
    page.limit = 2;
    page.offset = 3;
    let result = sandbox.execute_query(page).await.unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.total_rows, 4);
}

#[tokio::test]
async fn test_write_statements_rejected_before_execution() {
    let lake = lake().await;
    let sandbox = sandbox(&lake);

    for sql in [
        "DELETE FROM mar09.customers",
        "SELECT 1; SELECT 2",
        "PRAGMA version",
        "SELECT * FROM t WHERE 1 = 1 OR drop",
    ] {
        let err = sandbox
            .execute_query(QueryRequest::new(sql))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidSql, "{}", sql);
    }
}

#[tokio::test]
async fn test_engine_errors_are_execution_failures() {
    let lake = lake().await;
    let err = sandbox(&lake)
        .execute_query(QueryRequest::new("SELECT * FROM nowhere.missing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::QueryExecutionFailed);
}

#[tokio::test]
async fn test_running_snapshot_cannot_be_viewed() {
    let lake = lake().await;
    let ds = lake.fx.save_datasource(lake.fx.input("other"));
    let running = SnapshotMeta::start(
        &ds,
        SnapshotKind::Daily,
        chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        at(2024, 3, 9, 2),
    );

    let err = SnapshotViews::statements(
        &[SnapshotSelection::new("live", running)],
        lake.fx.storage.as_ref(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_duplicate_or_malformed_alias_rejected() {
    let lake = lake().await;
    let storage: Arc<dyn StorageProvider> = lake.fx.storage.clone();

    let dup = SnapshotViews::statements(
        &[
            SnapshotSelection::new("snap", lake.before.clone()),
            SnapshotSelection::new("SNAP", lake.after.clone()),
        ],
        storage.as_ref(),
    )
    .await
    .unwrap_err();
    assert_eq!(dup.kind(), ExErrorKind::InvalidInput);

    let bad = SnapshotViews::statements(
        &[SnapshotSelection::new("9lives", lake.before.clone())],
        storage.as_ref(),
    )
    .await
    .unwrap_err();
    assert_eq!(bad.kind(), ExErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_describe_table() {
    let lake = lake().await;
    let columns = sandbox(&lake)
        .describe_table(&customers_uri(&lake).await)
        .await
        .unwrap();

    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "balance"]);
    assert_eq!(columns[0].data_type, "BIGINT");
    assert_eq!(columns[1].data_type, "VARCHAR");
    assert_eq!(columns[2].data_type, "DOUBLE");
}

#[tokio::test]
async fn test_count_rows() {
    let lake = lake().await;
    let count = sandbox(&lake)
        .count_rows(&customers_uri(&lake).await)
        .await
        .unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn test_preview_with_filter_and_order() {
    let lake = lake().await;
    let sandbox = sandbox(&lake);
    let uri = customers_uri(&lake).await;

    let result = sandbox
        .preview_table(&uri, Some("balance > 1"), Some("id DESC"), 10, 0)
        .await
        .unwrap();
    assert_eq!(result.total_rows, 2);
    let mut names: Vec<_> = result
        .rows
        .iter()
        .map(|r| r[1].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["ada".to_string(), "dennis".to_string()]);

    let err = sandbox
        .preview_table(&uri, Some("1 = 1; DROP TABLE x"), None, 10, 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidSql);
}
