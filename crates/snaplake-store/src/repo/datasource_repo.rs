//! SQLite datasource repository

use rusqlite::{OptionalExtension, Row};
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::{Datasource, DatasourceRecord};
use std::sync::Arc;

use super::{is_constraint_violation, ts_from_db, ts_to_db, DatasourceRepository};
use crate::codec::ListCodec;
use crate::db::Database;
use crate::errors::{from_rusqlite, Result};

const SELECT_COLUMNS: &str = "SELECT id, name, source_type, host, port, database_name, username,
        password, schemas_json, include_tables_json, cron, daily_max_count, monthly_max_count,
        enabled, created_at, updated_at
     FROM datasources";

pub struct SqliteDatasourceRepo {
    db: Database,
    codec: Arc<dyn ListCodec>,
}

/// Raw column values before list decoding
struct DatasourceRow {
    id: String,
    name: String,
    source_type: String,
    host: String,
    port: i64,
    database: String,
    username: String,
    password: String,
    schemas_json: String,
    include_tables_json: Option<String>,
    cron: Option<String>,
    daily_max_count: i64,
    monthly_max_count: i64,
    enabled: bool,
    created_at: i64,
    updated_at: i64,
}

impl DatasourceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            source_type: row.get(2)?,
            host: row.get(3)?,
            port: row.get(4)?,
            database: row.get(5)?,
            username: row.get(6)?,
            password: row.get(7)?,
            schemas_json: row.get(8)?,
            include_tables_json: row.get(9)?,
            cron: row.get(10)?,
            daily_max_count: row.get(11)?,
            monthly_max_count: row.get(12)?,
            enabled: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_domain(self, codec: &dyn ListCodec) -> Result<Datasource> {
        let include_tables = match self.include_tables_json {
            Some(raw) => Some(codec.decode(&raw)?),
            None => None,
        };
        let record = DatasourceRecord {
            id: self.id,
            name: self.name,
            source_type: self.source_type,
            host: self.host,
            port: self.port,
            database: self.database,
            username: self.username,
            password: self.password,
            schemas: codec.decode(&self.schemas_json)?,
            include_tables,
            cron: self.cron,
            daily_max_count: self.daily_max_count,
            monthly_max_count: self.monthly_max_count,
            enabled: self.enabled,
            created_at: ts_from_db(self.created_at)?,
            updated_at: ts_from_db(self.updated_at)?,
        };
        Datasource::restore(record).map_err(ExError::from)
    }
}

impl SqliteDatasourceRepo {
    pub fn new(db: Database, codec: Arc<dyn ListCodec>) -> Self {
        Self { db, codec }
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Datasource>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
            let rows = stmt
                .query_map(params, DatasourceRow::from_row)
                .map_err(from_rusqlite)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(from_rusqlite)?;
            Ok(rows)
        })?;
        rows.into_iter()
            .map(|r| r.into_domain(self.codec.as_ref()))
            .collect()
    }
}

impl DatasourceRepository for SqliteDatasourceRepo {
    fn save(&self, datasource: &Datasource) -> Result<()> {
        let record = datasource.to_record();
        let schemas_json = self.codec.encode(&record.schemas)?;
        let include_json = match &record.include_tables {
            Some(tables) => Some(self.codec.encode(tables)?),
            None => None,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO datasources (id, name, source_type, host, port, database_name,
                    username, password, schemas_json, include_tables_json, cron,
                    daily_max_count, monthly_max_count, enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    source_type = excluded.source_type,
                    host = excluded.host,
                    port = excluded.port,
                    database_name = excluded.database_name,
                    username = excluded.username,
                    password = excluded.password,
                    schemas_json = excluded.schemas_json,
                    include_tables_json = excluded.include_tables_json,
                    cron = excluded.cron,
                    daily_max_count = excluded.daily_max_count,
                    monthly_max_count = excluded.monthly_max_count,
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    record.id,
                    record.name,
                    record.source_type,
                    record.host,
                    record.port,
                    record.database,
                    record.username,
                    record.password,
                    schemas_json,
                    include_json,
                    record.cron,
                    record.daily_max_count,
                    record.monthly_max_count,
                    record.enabled,
                    ts_to_db(&record.created_at),
                    ts_to_db(&record.updated_at),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    ExError::new(ExErrorKind::AlreadyExists)
                        .with_op("save_datasource")
                        .with_entity_id(record.name.clone())
                        .with_message(format!("Datasource '{}' already exists", record.name))
                } else {
                    from_rusqlite(e)
                }
            })?;
            Ok(())
        })
    }

    fn get(&self, id: &str) -> Result<Option<Datasource>> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let row = self.db.with_conn(|conn| {
            conn.query_row(&sql, [id], DatasourceRow::from_row)
                .optional()
                .map_err(from_rusqlite)
        })?;
        row.map(|r| r.into_domain(self.codec.as_ref())).transpose()
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Datasource>> {
        let sql = format!("{} WHERE name = ?1", SELECT_COLUMNS);
        let row = self.db.with_conn(|conn| {
            conn.query_row(&sql, [name], DatasourceRow::from_row)
                .optional()
                .map_err(from_rusqlite)
        })?;
        row.map(|r| r.into_domain(self.codec.as_ref())).transpose()
    }

    fn list(&self) -> Result<Vec<Datasource>> {
        self.query(&format!("{} ORDER BY name", SELECT_COLUMNS), &[])
    }

    fn list_enabled(&self) -> Result<Vec<Datasource>> {
        self.query(
            &format!("{} WHERE enabled = 1 ORDER BY name", SELECT_COLUMNS),
            &[],
        )
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let n = conn
                .execute("DELETE FROM datasources WHERE id = ?1", [id])
                .map_err(from_rusqlite)?;
            Ok(n > 0)
        })
    }
}
