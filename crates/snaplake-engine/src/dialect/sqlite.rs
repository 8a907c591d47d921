//! SQLite sources through rusqlite
//!
//! `database` is the path to the database file; host, port and credentials
//! are ignored. The file is opened read-only. rusqlite is synchronous, so
//! each call runs to completion on the calling task.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use snaplake_core::model::SourceType;
use std::path::Path;

use super::{quote_double, ConnectionTarget, Dialect, SourceConnection};
use crate::errors::{connection_failed, source_query, Result};
use crate::snapshot::columnar::{Cell, ColumnSpec, ColumnType, ColumnarFile, ColumnarWriter};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

#[async_trait]
impl Dialect for SqliteDialect {
    fn source_type(&self) -> SourceType {
        SourceType::Sqlite
    }

    async fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn SourceConnection>> {
        let path = Path::new(&target.database);
        if !path.is_file() {
            return Err(connection_failed(
                "sqlite_connect",
                format!("SQLite database file '{}' does not exist", target.database),
            ));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| connection_failed("sqlite_connect", e.to_string()))?;

        // Opening is lazy; touch the schema so a corrupt file fails here
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
            .map_err(|e| connection_failed("sqlite_connect", e.to_string()))?;

        Ok(Box::new(SqliteConnection { conn }))
    }
}

struct SqliteConnection {
    conn: Connection,
}

/// Column type from a declared SQLite type, by affinity
fn column_type_for(declared: &str) -> ColumnType {
    let declared = declared.to_ascii_uppercase();
    if declared.contains("BOOL") {
        ColumnType::Boolean
    } else if declared.contains("INT") {
        ColumnType::Int64
    } else if declared.contains("CHAR") || declared.contains("CLOB") || declared.contains("TEXT")
    {
        ColumnType::Utf8
    } else if declared.contains("BLOB") {
        ColumnType::Binary
    } else if declared.contains("REAL") || declared.contains("FLOA") || declared.contains("DOUB")
    {
        ColumnType::Float64
    } else {
        // NUMERIC, DATE, DECIMAL and untyped columns keep their text form
        ColumnType::Utf8
    }
}

/// Storage classes a column type accepts without loss
fn accepts(column_type: ColumnType, class: &str) -> bool {
    match (column_type, class) {
        (_, "null") | (ColumnType::Utf8, _) => true,
        (ColumnType::Boolean | ColumnType::Int64, "integer") => true,
        (ColumnType::Float64, "integer" | "real") => true,
        (ColumnType::Binary, "blob" | "text") => true,
        _ => false,
    }
}

/// Widen a declared type to cover the storage classes found in the data
///
/// SQLite lets any column hold any class. Numeric mixes become Float64;
/// anything else falls back to text.
fn widen(declared: ColumnType, classes: &[String]) -> ColumnType {
    if classes.iter().all(|c| accepts(declared, c)) {
        declared
    } else if classes.iter().all(|c| accepts(ColumnType::Float64, c)) {
        ColumnType::Float64
    } else {
        ColumnType::Utf8
    }
}

fn cell_from(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(v) => Cell::Int(v),
        ValueRef::Real(v) => Cell::Float(v),
        ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Cell::Bytes(b.to_vec()),
    }
}

impl SqliteConnection {
    /// (name, declared type, pk ordinal) per column
    fn table_info(&self, schema: &str, table: &str) -> Result<Vec<(String, String, i64)>> {
        let entity = format!("{}.{}", schema, table);
        let mut stmt = self
            .conn
            .prepare("SELECT name, type, pk FROM pragma_table_info(?1, ?2) ORDER BY cid")
            .map_err(|e| source_query("sqlite_table_info", &entity, e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![table, schema], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(|e| source_query("sqlite_table_info", &entity, e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| source_query("sqlite_table_info", &entity, e.to_string()))?;
        Ok(rows)
    }

    /// Distinct `typeof()` results present in one column
    fn storage_classes(&self, schema: &str, table: &str, column: &str) -> Result<Vec<String>> {
        let entity = format!("{}.{}", schema, table);
        let sql = format!(
            "SELECT DISTINCT typeof({}) FROM {}.{}",
            quote_double(column),
            quote_double(schema),
            quote_double(table)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| source_query("sqlite_storage_classes", &entity, e.to_string()))?;
        let classes = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| source_query("sqlite_storage_classes", &entity, e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| source_query("sqlite_storage_classes", &entity, e.to_string()))?;
        Ok(classes)
    }
}

#[async_trait]
impl SourceConnection for SqliteConnection {
    async fn list_tables(&mut self, schema: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM {}.sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
            quote_double(schema)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| source_query("sqlite_list_tables", schema, e.to_string()))?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| source_query("sqlite_list_tables", schema, e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| source_query("sqlite_list_tables", schema, e.to_string()))?;
        Ok(tables)
    }

    async fn primary_keys(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        let mut keyed: Vec<(i64, String)> = self
            .table_info(schema, table)?
            .into_iter()
            .filter(|(_, _, pk)| *pk > 0)
            .map(|(name, _, pk)| (pk, name))
            .collect();
        keyed.sort();
        Ok(keyed.into_iter().map(|(_, name)| name).collect())
    }

    async fn export_table(&mut self, schema: &str, table: &str) -> Result<ColumnarFile> {
        let entity = format!("{}.{}", schema, table);
        let mut columns = Vec::new();
        for (name, declared, _) in self.table_info(schema, table)? {
            let classes = self.storage_classes(schema, table, &name)?;
            let column_type = widen(column_type_for(&declared), &classes);
            columns.push(ColumnSpec::new(name, column_type));
        }
        let mut writer = ColumnarWriter::new(columns)?;
        let width = writer.columns().len();

        let sql = format!(
            "SELECT * FROM {}.{}",
            quote_double(schema),
            quote_double(table)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| source_query("sqlite_export", &entity, e.to_string()))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| source_query("sqlite_export", &entity, e.to_string()))?;

        while let Some(row) = rows
            .next()
            .map_err(|e| source_query("sqlite_export", &entity, e.to_string()))?
        {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| source_query("sqlite_export", &entity, e.to_string()))?;
                cells.push(cell_from(value));
            }
            writer.push_row(cells)?;
        }

        writer.finish()
    }
}
