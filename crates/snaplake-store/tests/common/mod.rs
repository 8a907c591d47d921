#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use snaplake_core::model::{
    Datasource, NewDatasource, RetentionPolicy, SnapshotKind, SnapshotMeta, SourceType,
};
use snaplake_core_types::Sensitive;
use snaplake_store::codec::{JsonListCodec, ListCodec};
use snaplake_store::repo::{SqliteDatasourceRepo, SqliteSnapshotRepo};
use snaplake_store::Database;
use std::sync::Arc;

pub fn codec() -> Arc<dyn ListCodec> {
    Arc::new(JsonListCodec)
}

pub fn repos(db: &Database) -> (SqliteDatasourceRepo, SqliteSnapshotRepo) {
    (
        SqliteDatasourceRepo::new(db.clone(), codec()),
        SqliteSnapshotRepo::new(db.clone(), codec()),
    )
}

pub fn new_datasource(name: &str) -> Datasource {
    Datasource::create(
        NewDatasource {
            name: name.to_string(),
            source_type: SourceType::Postgresql,
            host: "db.internal".to_string(),
            port: 5432,
            database: "app".to_string(),
            username: "reader".to_string(),
            password: Sensitive::from("plaintext-password"),
            schemas: vec!["public".to_string(), "audit".to_string()],
            include_tables: Some(vec!["orders".to_string()]),
            cron: Some("0 2 * * *".to_string()),
            retention: RetentionPolicy::new(3, 2),
        },
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    )
    .unwrap()
}

pub fn running_snapshot(ds: &Datasource, day: u32, hour: u32) -> SnapshotMeta {
    let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
    SnapshotMeta::start(
        ds,
        SnapshotKind::for_date(date),
        date,
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap(),
    )
}
