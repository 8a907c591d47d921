use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snaplake_core_types::Sensitive;
use std::fmt;
use std::str::FromStr;

use super::retention::RetentionPolicy;
use crate::errors::{LakeError, Result};
use crate::rules::validation::validate_new_datasource;

/// Kind of relational source a datasource connects to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Sqlite,
    Postgresql,
    Mysql,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Sqlite => "SQLITE",
            SourceType::Postgresql => "POSTGRESQL",
            SourceType::Mysql => "MYSQL",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            // SQLite has no network endpoint; the port is carried but ignored
            SourceType::Sqlite => 1,
            SourceType::Postgresql => 5432,
            SourceType::Mysql => 3306,
        }
    }

    /// Schema to snapshot when the caller does not name one
    pub fn default_schema(&self) -> &'static str {
        match self {
            SourceType::Sqlite => "main",
            SourceType::Postgresql => "public",
            SourceType::Mysql => "",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = LakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SQLITE" => Ok(SourceType::Sqlite),
            "POSTGRESQL" | "POSTGRES" => Ok(SourceType::Postgresql),
            "MYSQL" => Ok(SourceType::Mysql),
            _ => Err(LakeError::UnknownSourceType {
                value: s.to_string(),
            }),
        }
    }
}

/// How to reach a source. `password` holds the sealed (encrypted) form.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Sensitive<String>,
}

/// Input to the validated datasource factory
#[derive(Debug, Clone)]
pub struct NewDatasource {
    pub name: String,
    pub source_type: SourceType,
    pub host: String,
    pub port: u32,
    pub database: String,
    pub username: String,
    /// Sealed password (see `CredentialCipher::seal`)
    pub password: Sensitive<String>,
    pub schemas: Vec<String>,
    pub include_tables: Option<Vec<String>>,
    pub cron: Option<String>,
    pub retention: RetentionPolicy,
}

/// Persisted row shape for a datasource
#[derive(Debug, Clone)]
pub struct DatasourceRecord {
    pub id: String,
    pub name: String,
    pub source_type: String,
    pub host: String,
    pub port: i64,
    pub database: String,
    pub username: String,
    pub password: String,
    pub schemas: Vec<String>,
    pub include_tables: Option<Vec<String>>,
    pub cron: Option<String>,
    pub daily_max_count: i64,
    pub monthly_max_count: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A configured relational source plus its snapshot policy
///
/// Only `create` (validated) and `restore` (from storage) build one; after
/// that `enable`/`disable` are the only mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct Datasource {
    id: String,
    name: String,
    source_type: SourceType,
    connection: ConnectionParams,
    schemas: Vec<String>,
    include_tables: Option<Vec<String>>,
    cron: Option<String>,
    retention: RetentionPolicy,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Datasource {
    /// Validate input and build an enabled datasource with a fresh UUIDv7 id
    ///
    /// # Errors
    /// `LakeError::InvalidDatasource` for name, schema or port violations and
    /// `LakeError::InvalidCron` for an unparseable schedule.
    pub fn create(input: NewDatasource, now: DateTime<Utc>) -> Result<Self> {
        validate_new_datasource(&input)?;

        let cron = input
            .cron
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let include_tables = input.include_tables.filter(|t| !t.is_empty());

        Ok(Self {
            id: uuid::Uuid::now_v7().to_string(),
            name: input.name.trim().to_string(),
            source_type: input.source_type,
            connection: ConnectionParams {
                host: input.host,
                port: input.port as u16,
                database: input.database,
                username: input.username,
                password: input.password,
            },
            schemas: input.schemas,
            include_tables,
            cron,
            retention: input.retention,
            enabled: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild from a persisted row
    ///
    /// # Errors
    /// Fails when the stored source type is unknown or the port is out of range.
    pub fn restore(record: DatasourceRecord) -> Result<Self> {
        let source_type = record.source_type.parse()?;
        let port = u16::try_from(record.port)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| LakeError::InvalidDatasource {
                field: "port",
                reason: format!("stored port {} is out of range", record.port),
            })?;

        Ok(Self {
            id: record.id,
            name: record.name,
            source_type,
            connection: ConnectionParams {
                host: record.host,
                port,
                database: record.database,
                username: record.username,
                password: Sensitive::new(record.password),
            },
            schemas: record.schemas,
            include_tables: record.include_tables,
            cron: record.cron,
            retention: RetentionPolicy {
                daily_max_count: record.daily_max_count.max(0) as u32,
                monthly_max_count: record.monthly_max_count.max(0) as u32,
            },
            enabled: record.enabled,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn to_record(&self) -> DatasourceRecord {
        DatasourceRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            source_type: self.source_type.as_str().to_string(),
            host: self.connection.host.clone(),
            port: i64::from(self.connection.port),
            database: self.connection.database.clone(),
            username: self.connection.username.clone(),
            password: self.connection.password.expose().clone(),
            schemas: self.schemas.clone(),
            include_tables: self.include_tables.clone(),
            cron: self.cron.clone(),
            daily_max_count: i64::from(self.retention.daily_max_count),
            monthly_max_count: i64::from(self.retention.monthly_max_count),
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn enable(&mut self, now: DateTime<Utc>) {
        self.enabled = true;
        self.updated_at = now;
    }

    pub fn disable(&mut self, now: DateTime<Utc>) {
        self.enabled = false;
        self.updated_at = now;
    }

    /// Whether `schema.table` passes the inclusion allowlist
    ///
    /// Entries match either the bare table name or `schema.table`. No
    /// allowlist means every table is included.
    pub fn includes_table(&self, schema: &str, table: &str) -> bool {
        match &self.include_tables {
            None => true,
            Some(allow) => {
                let qualified = format!("{}.{}", schema, table);
                allow.iter().any(|entry| {
                    entry.eq_ignore_ascii_case(table) || entry.eq_ignore_ascii_case(&qualified)
                })
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    pub fn schemas(&self) -> &[String] {
        &self.schemas
    }

    pub fn include_tables(&self) -> Option<&[String]> {
        self.include_tables.as_deref()
    }

    pub fn cron(&self) -> Option<&str> {
        self.cron.as_deref()
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
