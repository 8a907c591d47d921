use thiserror::Error;

use crate::model::SnapshotStatus;

/// Result type alias using LakeError
pub type Result<T> = std::result::Result<T, LakeError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure surfaced by SnapLake belongs to exactly one kind, and each
/// kind maps to a stable code that callers (CLI exit handling, API adapters,
/// tests) can dispatch on without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation
    InvalidInput,
    InvalidSql,
    InvalidCron,
    InvalidStorageKey,
    InvalidTransition,

    // Lifecycle
    SystemAlreadyInitialized,
    DatasourceNotFound,
    SnapshotNotFound,
    SnapshotAlreadyRunning,
    AlreadyExists,
    NotFound,

    // Connectivity
    DatasourceConnectionFailed,
    StorageConnectionFailed,

    // Auth
    InvalidCredentials,

    // Query
    QueryExecutionFailed,

    // Integration/IO
    Configuration,
    Crypto,
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidSql => "ERR_INVALID_SQL",
            ExErrorKind::InvalidCron => "ERR_INVALID_CRON",
            ExErrorKind::InvalidStorageKey => "ERR_INVALID_STORAGE_KEY",
            ExErrorKind::InvalidTransition => "ERR_INVALID_TRANSITION",
            ExErrorKind::SystemAlreadyInitialized => "ERR_SYSTEM_ALREADY_INITIALIZED",
            ExErrorKind::DatasourceNotFound => "ERR_DATASOURCE_NOT_FOUND",
            ExErrorKind::SnapshotNotFound => "ERR_SNAPSHOT_NOT_FOUND",
            ExErrorKind::SnapshotAlreadyRunning => "ERR_SNAPSHOT_ALREADY_RUNNING",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::DatasourceConnectionFailed => "ERR_DATASOURCE_CONNECTION_FAILED",
            ExErrorKind::StorageConnectionFailed => "ERR_STORAGE_CONNECTION_FAILED",
            ExErrorKind::InvalidCredentials => "ERR_INVALID_CREDENTIALS",
            ExErrorKind::QueryExecutionFailed => "ERR_QUERY_EXECUTION_FAILED",
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::Crypto => "ERR_CRYPTO",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Validation kinds are surfaced to the caller and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExErrorKind::InvalidInput
                | ExErrorKind::InvalidSql
                | ExErrorKind::InvalidCron
                | ExErrorKind::InvalidStorageKey
        )
    }
}

/// Canonical structured error type
///
/// Carries the kind (and therefore the stable code) plus optional context
/// about the operation and entity that failed.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context (datasource id, snapshot id, storage key...)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain-level failures raised by the model, rules and cipher
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LakeError {
    /// A datasource field violates its invariant
    #[error("Invalid datasource field '{field}': {reason}")]
    InvalidDatasource { field: &'static str, reason: String },

    /// Snapshot lifecycle transition attempted from the wrong state
    #[error("Cannot {action} snapshot {snapshot_id}: status is {from}")]
    InvalidTransition {
        snapshot_id: String,
        from: SnapshotStatus,
        action: &'static str,
    },

    /// User-supplied SQL rejected by the sandbox guard
    #[error("Invalid SQL: {reason}")]
    InvalidSql { reason: String },

    /// Cron expression could not be parsed
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// Storage key is absolute, empty or escapes the root
    #[error("Invalid storage key '{key}': {reason}")]
    InvalidStorageKey { key: String, reason: String },

    /// Source type string does not name a supported dialect
    #[error("Unknown source type: {value}")]
    UnknownSourceType { value: String },

    /// Unknown snapshot kind/status/storage kind while decoding a stored row
    #[error("Unknown {what}: {value}")]
    UnknownVariant { what: &'static str, value: String },

    /// Production profile without an encryption key
    #[error("Encryption key is required when running with the production profile")]
    MissingEncryptionKey,

    /// Encryption or decryption failed
    #[error("Crypto error: {message}")]
    Crypto { message: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization error (JSON encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl From<LakeError> for ExError {
    fn from(err: LakeError) -> Self {
        let message = err.to_string();
        match err {
            LakeError::InvalidDatasource { field, .. } => ExError::new(ExErrorKind::InvalidInput)
                .with_entity_id(field)
                .with_message(message),
            LakeError::InvalidTransition { snapshot_id, .. } => {
                ExError::new(ExErrorKind::InvalidTransition)
                    .with_entity_id(snapshot_id)
                    .with_message(message)
            }
            LakeError::InvalidSql { .. } => {
                ExError::new(ExErrorKind::InvalidSql).with_message(message)
            }
            LakeError::InvalidCron { expression, .. } => ExError::new(ExErrorKind::InvalidCron)
                .with_entity_id(expression)
                .with_message(message),
            LakeError::InvalidStorageKey { key, .. } => {
                ExError::new(ExErrorKind::InvalidStorageKey)
                    .with_entity_id(key)
                    .with_message(message)
            }
            LakeError::UnknownSourceType { .. }
            | LakeError::MissingEncryptionKey
            | LakeError::Configuration { .. } => {
                ExError::new(ExErrorKind::Configuration).with_message(message)
            }
            LakeError::UnknownVariant { .. } | LakeError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
            LakeError::Crypto { .. } => ExError::new(ExErrorKind::Crypto).with_message(message),
        }
    }
}
