//! SQLite storage configuration repository (singleton row `id = 1`)

use rusqlite::OptionalExtension;
use snaplake_core::errors::ExError;
use snaplake_core::model::{StorageConfig, StorageKind};
use snaplake_core_types::Sensitive;

use super::{ts_from_db, ts_to_db, StorageConfigRepository};
use crate::db::Database;
use crate::errors::{from_rusqlite, Result};

pub struct SqliteStorageConfigRepo {
    db: Database,
}

impl SqliteStorageConfigRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

type StorageRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

impl StorageConfigRepository for SqliteStorageConfigRepo {
    fn get(&self) -> Result<Option<StorageConfig>> {
        let row: Option<StorageRow> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT kind, local_path, bucket, region, endpoint, access_key, secret_key,
                        updated_at
                 FROM storage_config WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()
            .map_err(from_rusqlite)
        })?;

        let Some((kind, local_path, bucket, region, endpoint, access_key, secret_key, updated)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(StorageConfig {
            kind: kind.parse::<StorageKind>().map_err(ExError::from)?,
            local_path,
            bucket,
            region,
            endpoint,
            access_key: access_key.map(Sensitive::new),
            secret_key: secret_key.map(Sensitive::new),
            updated_at: ts_from_db(updated)?,
        }))
    }

    fn save(&self, config: &StorageConfig) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO storage_config (id, kind, local_path, bucket, region, endpoint,
                    access_key, secret_key, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    local_path = excluded.local_path,
                    bucket = excluded.bucket,
                    region = excluded.region,
                    endpoint = excluded.endpoint,
                    access_key = excluded.access_key,
                    secret_key = excluded.secret_key,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    config.kind.as_str(),
                    config.local_path,
                    config.bucket,
                    config.region,
                    config.endpoint,
                    config.access_key.as_ref().map(|k| k.expose().clone()),
                    config.secret_key.as_ref().map(|k| k.expose().clone()),
                    ts_to_db(&config.updated_at),
                ],
            )
            .map_err(from_rusqlite)?;
            Ok(())
        })
    }
}
