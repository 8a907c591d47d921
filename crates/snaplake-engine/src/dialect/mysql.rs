//! MySQL sources through sqlx
//!
//! A MySQL "schema" is a database. An empty schema name falls back to the
//! database named in the connection. Values are normalized server-side the
//! same way as for PostgreSQL.

use async_trait::async_trait;
use futures::TryStreamExt;
use snaplake_core::model::SourceType;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Row};

use super::{quote_backtick, ConnectionTarget, Dialect, SourceConnection};
use crate::errors::{connection_failed, source_query, Result};
use crate::snapshot::columnar::{Cell, ColumnSpec, ColumnType, ColumnarFile, ColumnarWriter};

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

#[async_trait]
impl Dialect for MysqlDialect {
    fn source_type(&self) -> SourceType {
        SourceType::Mysql
    }

    async fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn SourceConnection>> {
        let options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .database(&target.database)
            .username(&target.username)
            .password(target.password.expose());
        let conn = options
            .connect()
            .await
            .map_err(|e| connection_failed("mysql_connect", e.to_string()))?;
        Ok(Box::new(MysqlConnection {
            conn,
            database: target.database.clone(),
        }))
    }
}

struct MysqlConnection {
    conn: MySqlConnection,
    database: String,
}

impl MysqlConnection {
    fn schema_or_default<'a>(&'a self, schema: &'a str) -> &'a str {
        if schema.is_empty() {
            &self.database
        } else {
            schema
        }
    }
}

/// `data_type` is `DATA_TYPE`; `column_type` is the full `COLUMN_TYPE`
fn projection(column: &str, data_type: &str, column_type: &str) -> (ColumnType, String) {
    let quoted = quote_backtick(column);
    match data_type {
        // Values above i64::MAX would wrap through SIGNED
        "bigint" if column_type.contains("unsigned") => {
            (ColumnType::Utf8, format!("CAST({} AS CHAR)", quoted))
        }
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            (ColumnType::Int64, format!("CAST({} AS SIGNED)", quoted))
        }
        "float" | "double" | "real" => (ColumnType::Float64, format!("({} + 0.0E0)", quoted)),
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            (ColumnType::Binary, quoted)
        }
        _ => (ColumnType::Utf8, format!("CAST({} AS CHAR)", quoted)),
    }
}

fn decode(
    row: &MySqlRow,
    idx: usize,
    column_type: ColumnType,
) -> std::result::Result<Cell, sqlx::Error> {
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
impl SourceConnection for MysqlConnection {
    async fn list_tables(&mut self, schema: &str) -> Result<Vec<String>> {
        let schema = self.schema_or_default(schema).to_string();
        sqlx::query_scalar::<_, String>(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES
             WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
             ORDER BY TABLE_NAME",
        )
        .bind(&schema)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| source_query("mysql_list_tables", &schema, e.to_string()))
    }

    async fn primary_keys(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        let schema = self.schema_or_default(schema).to_string();
        sqlx::query_scalar::<_, String>(
            "SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.KEY_COLUMN_USAGE
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
             ORDER BY ORDINAL_POSITION",
        )
        .bind(&schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| {
            source_query("mysql_primary_keys", &format!("{}.{}", schema, table), e.to_string())
        })
    }

    async fn export_table(&mut self, schema: &str, table: &str) -> Result<ColumnarFile> {
        let schema = self.schema_or_default(schema).to_string();
        let entity = format!("{}.{}", schema, table);
        let described: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR), CAST(COLUMN_TYPE AS CHAR)
             FROM information_schema.COLUMNS
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
             ORDER BY ORDINAL_POSITION",
        )
        .bind(&schema)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(|e| source_query("mysql_describe", &entity, e.to_string()))?;

        let (columns, select_list): (Vec<ColumnSpec>, Vec<String>) = described
            .iter()
            .map(|(name, data_type, full_type)| {
                let (column_type, expr) = projection(
                    name,
                    &data_type.to_ascii_lowercase(),
                    &full_type.to_ascii_lowercase(),
                );
                (ColumnSpec::new(name.clone(), column_type), expr)
            })
            .unzip();
        let types: Vec<ColumnType> = columns.iter().map(|c| c.column_type).collect();
        let mut writer = ColumnarWriter::new(columns)?;

        let sql = format!(
            "SELECT {} FROM {}.{}",
            select_list.join(", "),
            quote_backtick(&schema),
            quote_backtick(table)
        );
        let mut rows = sqlx::query(&sql).fetch(&mut self.conn);
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| source_query("mysql_export", &entity, e.to_string()))?
        {
            let cells = types
                .iter()
                .enumerate()
                .map(|(idx, ty)| decode(&row, idx, *ty))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| source_query("mysql_export", &entity, e.to_string()))?;
            writer.push_row(cells)?;
        }
        drop(rows);

        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_normalizes_integers_and_text() {
        assert_eq!(
            projection("id", "bigint", "bigint(20)").1,
            "CAST(`id` AS SIGNED)".to_string()
        );
        assert_eq!(projection("price", "decimal", "decimal(10,2)").0, ColumnType::Utf8);
        assert_eq!(projection("ratio", "double", "double").0, ColumnType::Float64);
    }

    #[test]
    fn test_unsigned_bigint_keeps_full_range_as_text() {
        assert_eq!(
            projection("hits", "bigint", "bigint(20) unsigned"),
            (ColumnType::Utf8, "CAST(`hits` AS CHAR)".to_string())
        );
        assert_eq!(
            projection("n", "int", "int(10) unsigned"),
            (ColumnType::Int64, "CAST(`n` AS SIGNED)".to_string())
        );
    }
}
