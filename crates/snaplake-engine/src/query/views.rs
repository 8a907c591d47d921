//! View setup for querying snapshots by alias
//!
//! Each selected snapshot becomes a DuckDB schema named by its alias with one
//! view per table, so `SELECT * FROM jan.orders JOIN feb.orders ...` compares
//! two points in time. When two schemas of one snapshot share a table name,
//! both views are named `schema_table`.

use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::SnapshotMeta;
use snaplake_store::lake::StorageProvider;
use std::collections::HashMap;

use crate::dialect::quote_double;
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct SnapshotSelection {
    pub alias: String,
    pub snapshot: SnapshotMeta,
}

impl SnapshotSelection {
    pub fn new(alias: impl Into<String>, snapshot: SnapshotMeta) -> Self {
        Self {
            alias: alias.into(),
            snapshot,
        }
    }
}

pub struct SnapshotViews;

fn invalid(message: String) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("snapshot_views")
        .with_message(message)
}

fn validate_alias(alias: &str) -> Result<()> {
    let mut chars = alias.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(invalid(format!(
            "Alias '{}' must be a letter or underscore followed by letters, digits or underscores",
            alias
        )))
    }
}

/// View name per table of one snapshot
fn view_names(snapshot: &SnapshotMeta) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for t in snapshot.tables() {
        *seen.entry(t.table.as_str()).or_default() += 1;
    }
    snapshot
        .tables()
        .iter()
        .map(|t| {
            if seen.get(t.table.as_str()).copied().unwrap_or(0) > 1 {
                format!("{}_{}", t.schema, t.table)
            } else {
                t.table.clone()
            }
        })
        .collect()
}

impl SnapshotViews {
    /// Setup statements for `selections`, resolving files through `storage`
    ///
    /// # Errors
    /// `InvalidInput` for a malformed or repeated alias or a RUNNING
    /// snapshot; storage errors while resolving file locations.
    pub async fn statements(
        selections: &[SnapshotSelection],
        storage: &dyn StorageProvider,
    ) -> Result<Vec<String>> {
        let mut aliases = std::collections::HashSet::new();
        let mut statements = Vec::new();

        for selection in selections {
            validate_alias(&selection.alias)?;
            if !aliases.insert(selection.alias.to_ascii_lowercase()) {
                return Err(invalid(format!(
                    "Alias '{}' is used more than once",
                    selection.alias
                )));
            }
            if selection.snapshot.is_running() {
                return Err(invalid(format!(
                    "Snapshot {} is still RUNNING",
                    selection.snapshot.id()
                )));
            }

            let alias = quote_double(&selection.alias);
            statements.push(format!("CREATE SCHEMA IF NOT EXISTS {}", alias));

            let tables = selection.snapshot.tables();
            for (table, view) in tables.iter().zip(view_names(&selection.snapshot)) {
                let uri = storage.get_uri(&table.storage_key).await?;
                statements.push(format!(
                    "CREATE OR REPLACE VIEW {}.{} AS SELECT * FROM read_parquet('{}')",
                    alias,
                    quote_double(&view),
                    uri.replace('\'', "''")
                ));
            }
        }

        Ok(statements)
    }
}
