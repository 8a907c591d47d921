//! Read-only SQL guard for the query sandbox
//!
//! Every user-supplied statement passes through `validate_read_only` before
//! it reaches the analytical engine. Fragments for table previews are checked
//! by wrapping them in a synthetic `SELECT 1 WHERE <clause>`.

use regex::Regex;

use crate::errors::{LakeError, Result};

const FORBIDDEN_KEYWORDS: &str =
    r"(?i)\b(insert|update|delete|drop|create|alter|truncate|grant|revoke|exec|execute)\b";

/// Reject anything that is not a single read-only SELECT/WITH statement
///
/// # Errors
/// `LakeError::InvalidSql` describing the first violated rule.
pub fn validate_read_only(sql: &str) -> Result<()> {
    if sql.contains(';') {
        return Err(LakeError::InvalidSql {
            reason: "statement separators are not allowed".to_string(),
        });
    }

    let keywords = Regex::new(FORBIDDEN_KEYWORDS).map_err(|e| LakeError::InvalidSql {
        reason: e.to_string(),
    })?;
    if let Some(found) = keywords.find(sql) {
        return Err(LakeError::InvalidSql {
            reason: format!(
                "keyword '{}' is not allowed in read-only queries",
                found.as_str().to_ascii_uppercase()
            ),
        });
    }

    let head = sql.trim().to_ascii_uppercase();
    if !(head.starts_with("SELECT") || head.starts_with("WITH")) {
        return Err(LakeError::InvalidSql {
            reason: "query must start with SELECT or WITH".to_string(),
        });
    }

    Ok(())
}

/// Validate a WHERE or ORDER BY fragment
///
/// # Errors
/// `LakeError::InvalidSql` when the synthetic statement is rejected.
pub fn validate_clause(clause: &str) -> Result<()> {
    validate_read_only(&format!("SELECT 1 WHERE {}", clause))
}
