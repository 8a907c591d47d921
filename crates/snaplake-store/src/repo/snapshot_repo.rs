//! SQLite snapshot repository
//!
//! A snapshot row plus its ordered `snapshot_tables` rows make one aggregate.
//! `save` rewrites both inside a transaction so a reader never observes a
//! status without the tables that preceded it.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::{SnapshotMeta, SnapshotRecord, SnapshotStatus, TableMeta};
use std::sync::Arc;

use super::{
    date_from_db, date_to_db, is_constraint_violation, ts_from_db, ts_to_db, SnapshotRepository,
};
use crate::codec::ListCodec;
use crate::db::Database;
use crate::errors::{from_rusqlite, Result};

const SELECT_COLUMNS: &str = "SELECT id, datasource_id, datasource_name, kind, snapshot_date,
        status, started_at, completed_at, error_message, tags_json, memo
     FROM snapshots";

pub struct SqliteSnapshotRepo {
    db: Database,
    codec: Arc<dyn ListCodec>,
}

struct SnapshotRow {
    id: String,
    datasource_id: String,
    datasource_name: String,
    kind: String,
    snapshot_date: String,
    status: String,
    started_at: i64,
    completed_at: Option<i64>,
    error_message: Option<String>,
    tags_json: String,
    memo: Option<String>,
}

impl SnapshotRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            datasource_id: row.get(1)?,
            datasource_name: row.get(2)?,
            kind: row.get(3)?,
            snapshot_date: row.get(4)?,
            status: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
            error_message: row.get(8)?,
            tags_json: row.get(9)?,
            memo: row.get(10)?,
        })
    }
}

struct TableRow {
    schema: String,
    table: String,
    row_count: i64,
    byte_size: i64,
    storage_key: String,
    primary_keys_json: String,
}

impl SqliteSnapshotRepo {
    pub fn new(db: Database, codec: Arc<dyn ListCodec>) -> Self {
        Self { db, codec }
    }

    fn load_tables(conn: &Connection, snapshot_id: &str) -> Result<Vec<TableRow>> {
        let mut stmt = conn
            .prepare(
                "SELECT schema_name, table_name, row_count, byte_size, storage_key,
                        primary_keys_json
                 FROM snapshot_tables WHERE snapshot_id = ?1 ORDER BY ordinal",
            )
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([snapshot_id], |row| {
                Ok(TableRow {
                    schema: row.get(0)?,
                    table: row.get(1)?,
                    row_count: row.get(2)?,
                    byte_size: row.get(3)?,
                    storage_key: row.get(4)?,
                    primary_keys_json: row.get(5)?,
                })
            })
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(rows)
    }

    fn into_domain(&self, row: SnapshotRow, tables: Vec<TableRow>) -> Result<SnapshotMeta> {
        let tables = tables
            .into_iter()
            .map(|t| {
                Ok(TableMeta {
                    schema: t.schema,
                    table: t.table,
                    row_count: t.row_count.max(0) as u64,
                    byte_size: t.byte_size.max(0) as u64,
                    storage_key: t.storage_key,
                    primary_keys: self.codec.decode(&t.primary_keys_json)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let record = SnapshotRecord {
            id: row.id,
            datasource_id: row.datasource_id,
            datasource_name: row.datasource_name,
            kind: row.kind,
            snapshot_date: date_from_db(&row.snapshot_date)?,
            status: row.status,
            started_at: ts_from_db(row.started_at)?,
            completed_at: row.completed_at.map(ts_from_db).transpose()?,
            error_message: row.error_message,
            tags: self.codec.decode(&row.tags_json)?,
            memo: row.memo,
            tables,
        };
        SnapshotMeta::restore(record).map_err(ExError::from)
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<SnapshotMeta>> {
        let loaded = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
            let rows = stmt
                .query_map(params, SnapshotRow::from_row)
                .map_err(from_rusqlite)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(from_rusqlite)?;
            drop(stmt);

            rows.into_iter()
                .map(|row| {
                    let tables = Self::load_tables(conn, &row.id)?;
                    Ok((row, tables))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        loaded
            .into_iter()
            .map(|(row, tables)| self.into_domain(row, tables))
            .collect()
    }

    fn query_one(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<SnapshotMeta>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

impl SnapshotRepository for SqliteSnapshotRepo {
    fn save(&self, snapshot: &SnapshotMeta) -> Result<()> {
        let record = snapshot.to_record();
        let tags_json = self.codec.encode(&record.tags)?;
        let table_rows = record
            .tables
            .iter()
            .map(|t| Ok((t, self.codec.encode(&t.primary_keys)?)))
            .collect::<Result<Vec<_>>>()?;

        self.db.with_conn(|conn| {
            let tx = conn.transaction().map_err(from_rusqlite)?;

            tx.execute(
                "INSERT INTO snapshots (id, datasource_id, datasource_name, kind, snapshot_date,
                    status, started_at, completed_at, error_message, tags_json, memo)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    completed_at = excluded.completed_at,
                    error_message = excluded.error_message,
                    tags_json = excluded.tags_json,
                    memo = excluded.memo",
                rusqlite::params![
                    record.id,
                    record.datasource_id,
                    record.datasource_name,
                    record.kind,
                    date_to_db(record.snapshot_date),
                    record.status,
                    ts_to_db(&record.started_at),
                    record.completed_at.as_ref().map(ts_to_db),
                    record.error_message,
                    tags_json,
                    record.memo,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) && snapshot.status() == SnapshotStatus::Running {
                    ExError::new(ExErrorKind::SnapshotAlreadyRunning)
                        .with_op("save_snapshot")
                        .with_entity_id(record.datasource_id.clone())
                        .with_message("Another snapshot is already RUNNING for this datasource")
                } else {
                    from_rusqlite(e)
                }
            })?;

            tx.execute(
                "DELETE FROM snapshot_tables WHERE snapshot_id = ?1",
                [&record.id],
            )
            .map_err(from_rusqlite)?;

            for (ordinal, (table, pk_json)) in table_rows.iter().enumerate() {
                tx.execute(
                    "INSERT INTO snapshot_tables (snapshot_id, ordinal, schema_name, table_name,
                        row_count, byte_size, storage_key, primary_keys_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        record.id,
                        ordinal as i64,
                        table.schema,
                        table.table,
                        table.row_count as i64,
                        table.byte_size as i64,
                        table.storage_key,
                        pk_json,
                    ],
                )
                .map_err(from_rusqlite)?;
            }

            tx.commit().map_err(from_rusqlite)?;
            Ok(())
        })
    }

    fn get(&self, id: &str) -> Result<Option<SnapshotMeta>> {
        self.query_one(&format!("{} WHERE id = ?1", SELECT_COLUMNS), &[&id])
    }

    fn find_running(&self, datasource_id: &str) -> Result<Option<SnapshotMeta>> {
        self.query_one(
            &format!(
                "{} WHERE datasource_id = ?1 AND status = 'RUNNING' LIMIT 1",
                SELECT_COLUMNS
            ),
            &[&datasource_id],
        )
    }

    fn list_by_datasource(&self, datasource_id: &str) -> Result<Vec<SnapshotMeta>> {
        self.query(
            &format!(
                "{} WHERE datasource_id = ?1 ORDER BY snapshot_date DESC, started_at DESC",
                SELECT_COLUMNS
            ),
            &[&datasource_id],
        )
    }

    fn list_running(&self) -> Result<Vec<SnapshotMeta>> {
        self.query(
            &format!("{} WHERE status = 'RUNNING' ORDER BY started_at", SELECT_COLUMNS),
            &[],
        )
    }

    fn find_completed_on(
        &self,
        datasource_id: &str,
        date: NaiveDate,
    ) -> Result<Option<SnapshotMeta>> {
        let date = date_to_db(date);
        self.query_one(
            &format!(
                "{} WHERE datasource_id = ?1 AND snapshot_date = ?2 AND status = 'COMPLETED'
                 ORDER BY started_at DESC LIMIT 1",
                SELECT_COLUMNS
            ),
            &[&datasource_id, &date],
        )
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM snapshots WHERE id = ?1", [id])
                .map_err(from_rusqlite)?;
            Ok(n > 0)
        })
    }
}
