//! DuckDB query sandbox
//!
//! Every call opens a private in-memory DuckDB session on a blocking worker,
//! runs view setup, executes, and drops the session. Nothing is shared
//! between calls.
//!
//! User SQL must pass `sql_guard::validate_read_only` before it reaches
//! DuckDB; it is then wrapped for paging as
//! `SELECT * FROM (<sql>) AS _q LIMIT n OFFSET m`.

use duckdb::arrow::array::{Array, ArrayRef};
use duckdb::arrow::datatypes::DataType;
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::arrow::util::display::array_value_to_string;
use duckdb::Connection;
use serde::Serialize;
use serde_json::Value;
use snaplake_core::cipher::CredentialCipher;
use snaplake_core::errors::ExError;
use snaplake_core::model::{StorageConfig, StorageKind};
use snaplake_core::rules::sql_guard::{validate_clause, validate_read_only};
use snaplake_core::{log_op_end, log_op_error, log_op_start};
use snaplake_store::lake::factory::object_settings;
use snaplake_store::lake::object::ObjectStorageSettings;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::{internal, query_failed, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryColumn {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<Vec<Value>>,
    /// Row count of the unpaged query
    pub total_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    /// Needed only when views point at object storage
    pub storage: Option<StorageConfig>,
    pub limit: u64,
    pub offset: u64,
    /// Statements run before the query in the same session
    pub view_setup: Vec<String>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            storage: None,
            limit: 100,
            offset: 0,
            view_setup: Vec::new(),
        }
    }
}

pub struct QuerySandbox {
    cipher: Arc<CredentialCipher>,
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn read_parquet(uri: &str) -> String {
    format!("read_parquet({})", sql_literal(uri))
}

/// Session settings for S3-compatible storage
fn object_storage_setup(settings: &ObjectStorageSettings) -> Vec<String> {
    let mut statements = vec![
        "INSTALL httpfs".to_string(),
        "LOAD httpfs".to_string(),
        format!("SET s3_region = {}", sql_literal(&settings.region)),
        "SET s3_url_style = 'path'".to_string(),
    ];
    if let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.is_empty()) {
        let (host, ssl) = match endpoint.strip_prefix("http://") {
            Some(rest) => (rest, false),
            None => (endpoint.strip_prefix("https://").unwrap_or(endpoint), true),
        };
        statements.push(format!("SET s3_endpoint = {}", sql_literal(host.trim_end_matches('/'))));
        if !ssl {
            statements.push("SET s3_use_ssl = false".to_string());
        }
    }
    if let Some(key) = &settings.access_key {
        statements.push(format!("SET s3_access_key_id = {}", sql_literal(key.expose())));
    }
    if let Some(secret) = &settings.secret_key {
        statements.push(format!(
            "SET s3_secret_access_key = {}",
            sql_literal(secret.expose())
        ));
    }
    statements
}

fn cell_json(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    let Ok(text) = array_value_to_string(array.as_ref(), row) else {
        return Value::Null;
    };
    match array.data_type() {
        DataType::Boolean => Value::Bool(text == "true"),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            match text.parse::<i64>() {
                Ok(v) => Value::from(v),
                Err(_) => Value::String(text),
            }
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            match text.parse::<u64>() {
                Ok(v) => Value::from(v),
                Err(_) => Value::String(text),
            }
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            match text.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Some(n) => Value::Number(n),
                None => Value::String(text),
            }
        }
        _ => Value::String(text),
    }
}

fn open_session(setup: &[String]) -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| query_failed("open_session", e))?;
    for statement in setup {
        conn.execute_batch(statement)
            .map_err(|e| query_failed("session_setup", e))?;
    }
    Ok(conn)
}

/// Page `sql` and count its full result in one session
fn run_paged(conn: &Connection, sql: &str, limit: u64, offset: u64) -> Result<QueryResult> {
    let paged = format!(
        "SELECT * FROM (\n{}\n) AS _q LIMIT {} OFFSET {}",
        sql, limit, offset
    );
    let mut stmt = conn
        .prepare(&paged)
        .map_err(|e| query_failed("execute_query", e))?;
    let arrow = stmt
        .query_arrow([])
        .map_err(|e| query_failed("execute_query", e))?;
    let schema = arrow.get_schema();
    let batches: Vec<RecordBatch> = arrow.collect();

    let columns = schema
        .fields()
        .iter()
        .map(|f| QueryColumn {
            name: f.name().clone(),
            data_type: f.data_type().to_string(),
        })
        .collect();

    let mut rows = Vec::new();
    for batch in &batches {
        for row in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|col| cell_json(col, row))
                    .collect(),
            );
        }
    }

    let count_sql = format!("SELECT COUNT(*) FROM (\n{}\n) AS _c", sql);
    let total_rows: i64 = conn
        .query_row(&count_sql, [], |r| r.get(0))
        .map_err(|e| query_failed("count_query", e))?;

    Ok(QueryResult {
        columns,
        rows,
        total_rows: total_rows.max(0) as u64,
    })
}

/// Run `work` against a fresh session on the blocking pool
async fn with_session<T, F>(setup: Vec<String>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = open_session(&setup)?;
        work(&conn)
    })
    .await
    .map_err(|e| internal("query_worker", e.to_string()))?
}

impl QuerySandbox {
    pub fn new(cipher: Arc<CredentialCipher>) -> Self {
        Self { cipher }
    }

    fn storage_setup(&self, storage: Option<&StorageConfig>) -> Result<Vec<String>> {
        match storage {
            Some(config) if config.kind == StorageKind::Object => {
                Ok(object_storage_setup(&object_settings(config, &self.cipher)?))
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Validate and run user SQL
    ///
    /// # Errors
    /// `InvalidSql` before execution; `QueryExecutionFailed` from DuckDB.
    pub async fn execute_query(&self, request: QueryRequest) -> Result<QueryResult> {
        let start = Instant::now();
        log_op_start!("execute_query", limit = request.limit, offset = request.offset);

        let result = self.execute_inner(request).await;
        match &result {
            Ok(r) => {
                log_op_end!(
                    "execute_query",
                    duration_ms = start.elapsed().as_millis() as u64,
                    row_count = r.rows.len(),
                    total_rows = r.total_rows
                );
            }
            Err(e) => {
                log_op_error!(
                    "execute_query",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
            }
        }
        result
    }

    async fn execute_inner(&self, request: QueryRequest) -> Result<QueryResult> {
        validate_read_only(&request.sql).map_err(ExError::from)?;

        let mut setup = self.storage_setup(request.storage.as_ref())?;
        setup.extend(request.view_setup);
        let QueryRequest {
            sql, limit, offset, ..
        } = request;

        with_session(setup, move |conn| run_paged(conn, sql.trim(), limit, offset)).await
    }

    /// Column names, types and nullability of a Parquet file
    pub async fn describe_table(&self, uri: &str) -> Result<Vec<ColumnDescription>> {
        let sql = format!("DESCRIBE SELECT * FROM {}", read_parquet(uri));
        with_session(Vec::new(), move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| query_failed("describe_table", e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ColumnDescription {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                        nullable: row
                            .get::<_, Option<String>>(2)?
                            .map_or(true, |n| n.eq_ignore_ascii_case("YES")),
                    })
                })
                .map_err(|e| query_failed("describe_table", e))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| query_failed("describe_table", e))?;
            Ok(rows)
        })
        .await
    }

    pub async fn count_rows(&self, uri: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", read_parquet(uri));
        with_session(Vec::new(), move |conn| {
            let count: i64 = conn
                .query_row(&sql, [], |r| r.get(0))
                .map_err(|e| query_failed("count_rows", e))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    /// Page through a Parquet file with optional filter and ordering
    ///
    /// # Errors
    /// `InvalidSql` if either fragment fails validation.
    pub async fn preview_table(
        &self,
        uri: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<QueryResult> {
        let mut sql = format!("SELECT * FROM {}", read_parquet(uri));
        if let Some(clause) = where_clause.map(str::trim).filter(|c| !c.is_empty()) {
            validate_clause(clause).map_err(ExError::from)?;
            sql.push_str(&format!("\nWHERE {}", clause));
        }
        if let Some(order) = order_by.map(str::trim).filter(|c| !c.is_empty()) {
            validate_clause(order).map_err(ExError::from)?;
            sql.push_str(&format!("\nORDER BY {}", order));
        }

        with_session(Vec::new(), move |conn| run_paged(conn, &sql, limit, offset)).await
    }
}
