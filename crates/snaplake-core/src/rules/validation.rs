use crate::errors::{LakeError, Result};
use crate::model::NewDatasource;

use super::cron;

/// Characters and sequences that would let a name escape its storage prefix
const TRAVERSAL_PATTERNS: [&str; 4] = ["/", "\\", "..", "\0"];

/// Validate every datasource invariant before construction
///
/// # Errors
/// The first violation found, in field order: name, schemas, port, cron.
pub fn validate_new_datasource(input: &NewDatasource) -> Result<()> {
    validate_datasource_name(&input.name)?;

    if !input.schemas.iter().any(|s| !s.trim().is_empty()) {
        return Err(LakeError::InvalidDatasource {
            field: "schemas",
            reason: "at least one schema is required".to_string(),
        });
    }

    if !(1..=65535).contains(&input.port) {
        return Err(LakeError::InvalidDatasource {
            field: "port",
            reason: format!("{} is outside 1..=65535", input.port),
        });
    }

    if let Some(expr) = input.cron.as_deref().filter(|c| !c.trim().is_empty()) {
        cron::parse(expr)?;
    }

    Ok(())
}

/// # Errors
/// `LakeError::InvalidDatasource` for an empty name, `.`, or a traversal sequence.
pub fn validate_datasource_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LakeError::InvalidDatasource {
            field: "name",
            reason: "name must not be empty".to_string(),
        });
    }
    if name.trim() == "." {
        return Err(LakeError::InvalidDatasource {
            field: "name",
            reason: "name must not be \".\"".to_string(),
        });
    }
    if let Some(bad) = TRAVERSAL_PATTERNS.iter().find(|p| name.contains(**p)) {
        return Err(LakeError::InvalidDatasource {
            field: "name",
            reason: format!("name must not contain {:?}", bad),
        });
    }
    Ok(())
}

/// Storage keys are relative, `/`-separated and never climb out of the root
///
/// # Errors
/// `LakeError::InvalidStorageKey` describing the violation.
pub fn validate_storage_key(key: &str) -> Result<()> {
    let invalid = |reason: &str| LakeError::InvalidStorageKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(invalid("key must be relative"));
    }
    if key.contains('\0') {
        return Err(invalid("key contains NUL"));
    }
    if key.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid("key contains a '..' segment"));
    }
    Ok(())
}

/// Prefixes follow key rules but may be empty (the whole store)
///
/// # Errors
/// `LakeError::InvalidStorageKey` as for `validate_storage_key`.
pub fn validate_storage_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Ok(());
    }
    validate_storage_key(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_traversal_rejected() {
        for name in ["a/b", "a\\b", "..", "x..y", "nul\0"] {
            assert!(validate_datasource_name(name).is_err(), "{:?}", name);
        }
        assert!(validate_datasource_name("orders-prod").is_ok());
    }

    #[test]
    fn test_storage_key_rules() {
        assert!(validate_storage_key("shop/daily/2024-03-09/public.t.parquet").is_ok());
        assert!(validate_storage_key("/etc/passwd").is_err());
        assert!(validate_storage_key("shop/../../etc").is_err());
        assert!(validate_storage_key("").is_err());
        assert!(validate_storage_prefix("").is_ok());
    }
}
