//! PostgreSQL sources through sqlx
//!
//! Columns the Parquet file can hold natively are selected as a canonical
//! wire type (`int8`, `float8`, `bool`, `bytea`); everything else is cast to
//! text on the server so decoding never depends on extension types.

use async_trait::async_trait;
use futures::TryStreamExt;
use snaplake_core::model::SourceType;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{ConnectOptions, Row};

use super::{quote_double, ConnectionTarget, Dialect, SourceConnection};
use crate::errors::{connection_failed, source_query, Result};
use crate::snapshot::columnar::{Cell, ColumnSpec, ColumnType, ColumnarFile, ColumnarWriter};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

#[async_trait]
impl Dialect for PostgresDialect {
    fn source_type(&self) -> SourceType {
        SourceType::Postgresql
    }

    async fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn SourceConnection>> {
        let options = PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .database(&target.database)
            .username(&target.username)
            .password(target.password.expose());
        let conn = options
            .connect()
            .await
            .map_err(|e| connection_failed("postgres_connect", e.to_string()))?;
        Ok(Box::new(PostgresConnection { conn }))
    }
}

struct PostgresConnection {
    conn: PgConnection,
}

/// Column type and select expression for an `information_schema` data type
fn projection(column: &str, data_type: &str) -> (ColumnType, String) {
    let quoted = quote_double(column);
    match data_type {
        "boolean" => (ColumnType::Boolean, quoted),
        "smallint" | "integer" | "bigint" => (ColumnType::Int64, format!("{}::int8", quoted)),
        "real" | "double precision" => (ColumnType::Float64, format!("{}::float8", quoted)),
        "bytea" => (ColumnType::Binary, quoted),
        _ => (ColumnType::Utf8, format!("{}::text", quoted)),
    }
}

fn decode(row: &PgRow, idx: usize, column_type: ColumnType) -> std::result::Result<Cell, sqlx::Error> {
    let cell = match column_type {
        ColumnType::Boolean => row.try_get::<Option<bool>, _>(idx)?.map(Cell::Bool),
        ColumnType::Int64 => row.try_get::<Option<i64>, _>(idx)?.map(Cell::Int),
        ColumnType::Float64 => row.try_get::<Option<f64>, _>(idx)?.map(Cell::Float),
        ColumnType::Binary => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(Cell::Bytes),
        ColumnType::Utf8 => row.try_get::<Option<String>, _>(idx)?.map(Cell::Text),
    };
    Ok(cell.unwrap_or(Cell::Null))
}

#[async_trait]
impl SourceConnection for PostgresConnection {
    async fn list_tables(&mut self, schema: &str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = $1 AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .bind(schema)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| source_query("postgres_list_tables", schema, e.to_string()))
    }

    async fn primary_keys(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT kcu.column_name::text
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
              AND tc.table_name = kcu.table_name
             WHERE tc.constraint_type = 'PRIMARY KEY'
               AND tc.table_schema = $1 AND tc.table_name = $2
             ORDER BY kcu.ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| source_query("postgres_primary_keys", &format!("{}.{}", schema, table), e.to_string()))
    }

    async fn export_table(&mut self, schema: &str, table: &str) -> Result<ColumnarFile> {
        let entity = format!("{}.{}", schema, table);
        let described: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name::text, data_type::text FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| source_query("postgres_describe", &entity, e.to_string()))?;

        let (columns, select_list): (Vec<ColumnSpec>, Vec<String>) = described
            .iter()
            .map(|(name, data_type)| {
                let (column_type, expr) = projection(name, data_type);
                (ColumnSpec::new(name.clone(), column_type), expr)
            })
            .unzip();
        let types: Vec<ColumnType> = columns.iter().map(|c| c.column_type).collect();
        let mut writer = ColumnarWriter::new(columns)?;

        let sql = format!(
            "SELECT {} FROM {}.{}",
            select_list.join(", "),
            quote_double(schema),
            quote_double(table)
        );
        let mut rows = sqlx::query(&sql).fetch(&mut self.conn);
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| source_query("postgres_export", &entity, e.to_string()))?
        {
            let cells = types
                .iter()
                .enumerate()
                .map(|(idx, ty)| decode(&row, idx, *ty))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| source_query("postgres_export", &entity, e.to_string()))?;
            writer.push_row(cells)?;
        }
        drop(rows);

        writer.finish()
    }
}
