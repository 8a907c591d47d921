//! SnapLake Core - domain model and rules for the snapshot lake
//!
//! This crate holds everything that does not touch a database, a network or
//! the lake itself:
//! - Datasource, snapshot, storage config and user models
//! - Snapshot lifecycle transitions and retention planning
//! - Datasource, storage key, cron and read-only SQL validation
//! - The credential cipher
//! - Error, logging and configuration facilities shared by every crate

pub mod cipher;
pub mod clock;
pub mod config;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod rules;

// Re-exported so the logging macros can reach schema constants as `$crate::core_types`
pub use snaplake_core_types as core_types;

pub use cipher::{is_sealed, CredentialCipher, SEALED_MARKER};
pub use clock::{Clock, FixedClock, SystemClock};
pub use self::config::AppConfig;
pub use errors::{ExError, ExErrorKind, LakeError, Result};
pub use model::{
    Datasource, NewDatasource, RetentionPolicy, SnapshotKind, SnapshotMeta, SnapshotStatus,
    SourceType, StorageConfig, StorageKind, TableMeta, User,
};
