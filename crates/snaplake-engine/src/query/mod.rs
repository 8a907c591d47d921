//! Read-only analytical queries over the lake

pub mod sandbox;
pub mod views;

pub use sandbox::{ColumnDescription, QueryColumn, QueryRequest, QueryResult, QuerySandbox};
pub use views::{SnapshotSelection, SnapshotViews};
