use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::SourceType;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Dialect, MysqlDialect, PostgresDialect, SqliteDialect};
use crate::errors::Result;

/// Source type → dialect lookup
#[derive(Clone, Default)]
pub struct DialectRegistry {
    dialects: HashMap<SourceType, Arc<dyn Dialect>>,
}

impl DialectRegistry {
    /// Empty registry; see `with_defaults` for the built-in dialects
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SqliteDialect));
        registry.register(Arc::new(PostgresDialect));
        registry.register(Arc::new(MysqlDialect));
        registry
    }

    /// Replaces any dialect already registered for the same source type
    pub fn register(&mut self, dialect: Arc<dyn Dialect>) {
        self.dialects.insert(dialect.source_type(), dialect);
    }

    pub fn get(&self, source_type: SourceType) -> Result<Arc<dyn Dialect>> {
        self.dialects.get(&source_type).cloned().ok_or_else(|| {
            ExError::new(ExErrorKind::Configuration)
                .with_op("dialect_lookup")
                .with_entity_id(source_type.as_str())
                .with_message(format!("No dialect registered for {}", source_type))
        })
    }
}

impl std::fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.dialects.keys().map(SourceType::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("DialectRegistry")
            .field("dialects", &kinds)
            .finish()
    }
}
