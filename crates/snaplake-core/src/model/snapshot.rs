use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::datasource::Datasource;
use crate::errors::{LakeError, Result};

/// Which retention counter a snapshot falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotKind {
    Daily,
    Monthly,
}

impl SnapshotKind {
    /// First day of the month is a monthly snapshot, every other day is daily
    pub fn for_date(date: NaiveDate) -> Self {
        if date.day() == 1 {
            SnapshotKind::Monthly
        } else {
            SnapshotKind::Daily
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Daily => "DAILY",
            SnapshotKind::Monthly => "MONTHLY",
        }
    }

    /// Lowercase segment used in storage keys
    pub fn path_segment(&self) -> &'static str {
        match self {
            SnapshotKind::Daily => "daily",
            SnapshotKind::Monthly => "monthly",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = LakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DAILY" => Ok(SnapshotKind::Daily),
            "MONTHLY" => Ok(SnapshotKind::Monthly),
            other => Err(LakeError::UnknownVariant {
                what: "snapshot kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle status. RUNNING is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotStatus {
    Running,
    Completed,
    Failed,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Running => "RUNNING",
            SnapshotStatus::Completed => "COMPLETED",
            SnapshotStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SnapshotStatus::Running)
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotStatus {
    type Err = LakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RUNNING" => Ok(SnapshotStatus::Running),
            "COMPLETED" => Ok(SnapshotStatus::Completed),
            "FAILED" => Ok(SnapshotStatus::Failed),
            other => Err(LakeError::UnknownVariant {
                what: "snapshot status",
                value: other.to_string(),
            }),
        }
    }
}

/// One extracted table inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub schema: String,
    pub table: String,
    pub row_count: u64,
    pub byte_size: u64,
    pub storage_key: String,
    /// Primary key columns in ordinal order
    pub primary_keys: Vec<String>,
}

/// Storage prefix shared by all tables of one logical snapshot
pub fn snapshot_prefix(datasource_name: &str, kind: SnapshotKind, date: NaiveDate) -> String {
    format!(
        "{}/{}/{}/",
        datasource_name,
        kind.path_segment(),
        date.format("%Y-%m-%d")
    )
}

/// `{datasource}/{daily|monthly}/{YYYY-MM-DD}/{schema}.{table}.parquet`
pub fn table_storage_key(
    datasource_name: &str,
    kind: SnapshotKind,
    date: NaiveDate,
    schema: &str,
    table: &str,
) -> String {
    format!(
        "{}{}.{}.parquet",
        snapshot_prefix(datasource_name, kind, date),
        schema,
        table
    )
}

/// Persisted row shape for a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub id: String,
    pub datasource_id: String,
    pub datasource_name: String,
    pub kind: String,
    pub snapshot_date: NaiveDate,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub tags: Vec<String>,
    pub memo: Option<String>,
    pub tables: Vec<TableMeta>,
}

/// One point-in-time extraction run for a datasource
///
/// Owned by the orchestrator while RUNNING. Every transition checks the
/// current status first and leaves the aggregate untouched on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMeta {
    id: String,
    datasource_id: String,
    datasource_name: String,
    kind: SnapshotKind,
    snapshot_date: NaiveDate,
    started_at: DateTime<Utc>,
    status: SnapshotStatus,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    tags: Vec<String>,
    memo: Option<String>,
    tables: Vec<TableMeta>,
}

impl SnapshotMeta {
    /// Begin a new run in RUNNING
    pub fn start(
        datasource: &Datasource,
        kind: SnapshotKind,
        snapshot_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            datasource_id: datasource.id().to_string(),
            datasource_name: datasource.name().to_string(),
            kind,
            snapshot_date,
            started_at: now,
            status: SnapshotStatus::Running,
            completed_at: None,
            error_message: None,
            tags: Vec::new(),
            memo: None,
            tables: Vec::new(),
        }
    }

    /// Rebuild from a persisted row
    ///
    /// # Errors
    /// Fails on an unknown stored kind or status.
    pub fn restore(record: SnapshotRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            datasource_id: record.datasource_id,
            datasource_name: record.datasource_name,
            kind: record.kind.parse()?,
            snapshot_date: record.snapshot_date,
            started_at: record.started_at,
            status: record.status.parse()?,
            completed_at: record.completed_at,
            error_message: record.error_message,
            tags: record.tags,
            memo: record.memo,
            tables: record.tables,
        })
    }

    pub fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            id: self.id.clone(),
            datasource_id: self.datasource_id.clone(),
            datasource_name: self.datasource_name.clone(),
            kind: self.kind.as_str().to_string(),
            snapshot_date: self.snapshot_date,
            status: self.status.as_str().to_string(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message.clone(),
            tags: self.tags.clone(),
            memo: self.memo.clone(),
            tables: self.tables.clone(),
        }
    }

    /// Attach free-form labels before the run starts persisting
    pub fn with_annotations(mut self, tags: Vec<String>, memo: Option<String>) -> Self {
        self.tags = tags;
        self.memo = memo;
        self
    }

    fn ensure_running(&self, action: &'static str) -> Result<()> {
        if self.status != SnapshotStatus::Running {
            return Err(LakeError::InvalidTransition {
                snapshot_id: self.id.clone(),
                from: self.status,
                action,
            });
        }
        Ok(())
    }

    /// Append an extracted table. Only allowed while RUNNING.
    pub fn add_table(&mut self, table: TableMeta) -> Result<()> {
        self.ensure_running("add a table to")?;
        self.tables.push(table);
        Ok(())
    }

    /// RUNNING → COMPLETED
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_running("complete")?;
        self.status = SnapshotStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    /// RUNNING → FAILED
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_running("fail")?;
        self.status = SnapshotStatus::Failed;
        self.completed_at = Some(now);
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn storage_prefix(&self) -> String {
        snapshot_prefix(&self.datasource_name, self.kind, self.snapshot_date)
    }

    pub fn table_key(&self, schema: &str, table: &str) -> String {
        table_storage_key(
            &self.datasource_name,
            self.kind,
            self.snapshot_date,
            schema,
            table,
        )
    }

    pub fn is_running(&self) -> bool {
        self.status == SnapshotStatus::Running
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn datasource_id(&self) -> &str {
        &self.datasource_id
    }

    pub fn datasource_name(&self) -> &str {
        &self.datasource_name
    }

    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    pub fn snapshot_date(&self) -> NaiveDate {
        self.snapshot_date
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> SnapshotStatus {
        self.status
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn tables(&self) -> &[TableMeta] {
        &self.tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_date() {
        let first = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let second = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(SnapshotKind::for_date(first), SnapshotKind::Monthly);
        assert_eq!(SnapshotKind::for_date(second), SnapshotKind::Daily);
    }

    #[test]
    fn test_table_storage_key_layout() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            table_storage_key("shop", SnapshotKind::Daily, date, "public", "orders"),
            "shop/daily/2024-03-09/public.orders.parquet"
        );
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert!("PAUSED".parse::<SnapshotStatus>().is_err());
        assert_eq!(
            "FAILED".parse::<SnapshotStatus>().unwrap(),
            SnapshotStatus::Failed
        );
    }
}
