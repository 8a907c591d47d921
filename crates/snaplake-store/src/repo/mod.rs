//! Repository layer for persisting domain models to SQLite
//!
//! The traits are the persistence boundary the engine depends on. Each SQLite
//! implementation maps rows through the explicit `*Record` shapes in
//! snaplake-core; nothing is wired by reflection.

pub mod datasource_repo;
pub mod snapshot_repo;
pub mod storage_config_repo;
pub mod user_repo;

use chrono::{DateTime, NaiveDate, Utc};
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::{Datasource, SnapshotMeta, StorageConfig, User};

use crate::errors::Result;

pub use datasource_repo::SqliteDatasourceRepo;
pub use snapshot_repo::SqliteSnapshotRepo;
pub use storage_config_repo::SqliteStorageConfigRepo;
pub use user_repo::SqliteUserRepo;

pub trait DatasourceRepository: Send + Sync {
    /// Insert or update. A duplicate name is `AlreadyExists`.
    fn save(&self, datasource: &Datasource) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<Datasource>>;
    fn find_by_name(&self, name: &str) -> Result<Option<Datasource>>;
    /// All datasources ordered by name
    fn list(&self) -> Result<Vec<Datasource>>;
    fn list_enabled(&self) -> Result<Vec<Datasource>>;
    /// Removes the datasource and, by cascade, its snapshot metadata
    fn delete(&self, id: &str) -> Result<bool>;
}

pub trait SnapshotRepository: Send + Sync {
    /// Upsert the snapshot and replace its table list in one transaction
    fn save(&self, snapshot: &SnapshotMeta) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<SnapshotMeta>>;
    fn find_running(&self, datasource_id: &str) -> Result<Option<SnapshotMeta>>;
    /// Newest first: snapshot date, then start time
    fn list_by_datasource(&self, datasource_id: &str) -> Result<Vec<SnapshotMeta>>;
    fn list_running(&self) -> Result<Vec<SnapshotMeta>>;
    /// Most recent COMPLETED snapshot for a datasource on a logical date
    fn find_completed_on(
        &self,
        datasource_id: &str,
        date: NaiveDate,
    ) -> Result<Option<SnapshotMeta>>;
    fn delete(&self, id: &str) -> Result<bool>;
}

pub trait StorageConfigRepository: Send + Sync {
    fn get(&self) -> Result<Option<StorageConfig>>;
    fn save(&self, config: &StorageConfig) -> Result<()>;
}

pub trait UserRepository: Send + Sync {
    fn count(&self) -> Result<usize>;
    fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    fn save(&self, user: &User) -> Result<()>;
}

/// Timestamps are stored as microseconds since the epoch
pub(crate) fn ts_to_db(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

pub(crate) fn ts_from_db(micros: i64) -> Result<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("decode_timestamp")
            .with_message(format!("Timestamp {} is out of range", micros))
    })
}

pub(crate) fn date_to_db(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn date_from_db(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("decode_date")
            .with_message(format!("Invalid date '{}': {}", raw, e))
    })
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
