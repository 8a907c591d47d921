pub mod columnar;
pub mod orchestrator;

pub use columnar::{Cell, ColumnSpec, ColumnType, ColumnarFile, ColumnarWriter};
pub use orchestrator::{SnapshotOrchestrator, SnapshotTrigger};
