//! SnapLake Engine - snapshot orchestration, scheduling and querying
//!
//! Sits on top of snaplake-core (model, rules) and snaplake-store
//! (persistence, lake providers):
//! - `dialect`: per-source-type connection, introspection and extraction
//! - `snapshot`: the orchestrator and the Parquet writer
//! - `retention`, `recovery`, `scheduler`, `supervisor`: lifecycle upkeep
//! - `query`: the read-only DuckDB sandbox and snapshot views
//! - `setup`, `datasources`: services used by the CLI
//! - `runtime`: wiring from configuration

pub mod datasources;
pub mod dialect;
pub mod errors;
pub mod query;
pub mod recovery;
pub mod retention;
pub mod runtime;
pub mod scheduler;
pub mod setup;
pub mod snapshot;
pub mod supervisor;

pub use datasources::DatasourceService;
pub use dialect::{ConnectionCheck, ConnectionTarget, Dialect, DialectRegistry, SourceConnection};
pub use query::{QueryRequest, QueryResult, QuerySandbox, SnapshotSelection, SnapshotViews};
pub use recovery::RecoverySweep;
pub use retention::{RetentionEnforcer, RetentionReport};
pub use runtime::{Runtime, Services};
pub use scheduler::{ScheduledTask, Scheduler};
pub use setup::SystemSetup;
pub use snapshot::{SnapshotOrchestrator, SnapshotTrigger};
pub use supervisor::{StartupReport, Supervisor};
