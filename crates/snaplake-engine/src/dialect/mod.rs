//! Source dialects
//!
//! A `Dialect` knows how to reach one kind of relational source. The
//! connection it opens exposes the introspection and extraction calls the
//! orchestrator needs, one table at a time.

pub mod mysql;
pub mod postgres;
pub mod registry;
pub mod sqlite;

use async_trait::async_trait;
use snaplake_core::model::{ConnectionParams, SourceType};
use snaplake_core_types::Sensitive;

use crate::errors::Result;
use crate::snapshot::columnar::ColumnarFile;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use registry::DialectRegistry;
pub use sqlite::SqliteDialect;

/// Connection parameters with the password already unsealed
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Sensitive<String>,
}

impl ConnectionTarget {
    pub fn new(params: &ConnectionParams, password: Sensitive<String>) -> Self {
        Self {
            host: params.host.clone(),
            port: params.port,
            database: params.database.clone(),
            username: params.username.clone(),
            password,
        }
    }
}

/// Outcome of a connectivity probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
}

impl ConnectionCheck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "Connection successful".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Dialect: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Open a live session. Failures are `DatasourceConnectionFailed`.
    async fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn SourceConnection>>;

    /// Probe connectivity; never returns an error
    async fn test_connection(&self, target: &ConnectionTarget) -> ConnectionCheck {
        match self.connect(target).await {
            Ok(_) => ConnectionCheck::ok(),
            Err(e) => ConnectionCheck::failed(e.message().to_string()),
        }
    }
}

#[async_trait]
pub trait SourceConnection: Send {
    /// Base tables of `schema`, sorted by name
    async fn list_tables(&mut self, schema: &str) -> Result<Vec<String>>;

    /// Primary key columns in ordinal order; empty when the table has none
    async fn primary_keys(&mut self, schema: &str, table: &str) -> Result<Vec<String>>;

    /// Read every row of the table into a Parquet file
    async fn export_table(&mut self, schema: &str, table: &str) -> Result<ColumnarFile>;
}

/// `"ident"` with embedded quotes doubled
pub(crate) fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `` `ident` `` with embedded backticks doubled
pub(crate) fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}
