//! One-time migration of legacy plaintext credentials
//!
//! Datasource passwords and object-storage keys written before at-rest
//! encryption existed lack the `enc:v1:` marker. This pass seals them in
//! place. Already-sealed and empty values are left alone, so running it on
//! every start is harmless.

use rusqlite::Transaction;
use snaplake_core::cipher::{is_sealed, CredentialCipher};
use snaplake_core::errors::ExError;

use crate::db::Database;
use crate::errors::{from_rusqlite, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CredentialMigrationReport {
    pub datasource_passwords: usize,
    pub storage_secrets: usize,
}

impl CredentialMigrationReport {
    pub fn total(&self) -> usize {
        self.datasource_passwords + self.storage_secrets
    }
}

pub fn migrate_credentials(
    db: &Database,
    cipher: &CredentialCipher,
) -> Result<CredentialMigrationReport> {
    let report = db.with_conn(|conn| {
        let tx = conn.transaction().map_err(from_rusqlite)?;
        let report = CredentialMigrationReport {
            datasource_passwords: seal_column(&tx, cipher, "datasources", "id", "password")?,
            storage_secrets: seal_column(&tx, cipher, "storage_config", "id", "access_key")?
                + seal_column(&tx, cipher, "storage_config", "id", "secret_key")?,
        };
        tx.commit().map_err(from_rusqlite)?;
        Ok(report)
    })?;

    if report.total() > 0 {
        tracing::info!(
            component = module_path!(),
            datasource_passwords = report.datasource_passwords,
            storage_secrets = report.storage_secrets,
            "Sealed legacy plaintext credentials"
        );
    }

    Ok(report)
}

/// Seal every non-empty, unmarked value of `table.column`
///
/// Table and column names come from the fixed call sites above.
fn seal_column(
    tx: &Transaction<'_>,
    cipher: &CredentialCipher,
    table: &str,
    key_column: &str,
    column: &str,
) -> Result<usize> {
    let select = format!(
        "SELECT {key}, {col} FROM {table} WHERE {col} IS NOT NULL AND {col} != ''",
        key = key_column,
        col = column,
        table = table
    );
    let mut stmt = tx.prepare(&select).map_err(from_rusqlite)?;
    let rows: Vec<(rusqlite::types::Value, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    drop(stmt);

    let update = format!(
        "UPDATE {table} SET {col} = ?1 WHERE {key} = ?2",
        table = table,
        col = column,
        key = key_column
    );

    let mut sealed = 0;
    for (key, value) in rows.into_iter().filter(|(_, v)| !is_sealed(v)) {
        let ciphertext = cipher.seal(&value).map_err(ExError::from)?;
        tx.execute(&update, rusqlite::params![ciphertext, key])
            .map_err(from_rusqlite)?;
        sealed += 1;
    }
    Ok(sealed)
}
