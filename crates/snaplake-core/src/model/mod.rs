pub mod datasource;
pub mod retention;
pub mod snapshot;
pub mod storage_config;
pub mod user;

pub use datasource::{ConnectionParams, Datasource, DatasourceRecord, NewDatasource, SourceType};
pub use retention::{RetentionPlan, RetentionPolicy};
pub use snapshot::{
    snapshot_prefix, table_storage_key, SnapshotKind, SnapshotMeta, SnapshotRecord,
    SnapshotStatus, TableMeta,
};
pub use storage_config::{StorageConfig, StorageKind};
pub use user::User;
