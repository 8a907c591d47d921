//! Cron expression normalization
//!
//! Datasources store minute-level (5-field) or second-level (6/7-field)
//! expressions. The scheduler runs on the 6-field form.

use cron::Schedule;
use std::str::FromStr;

use crate::errors::{LakeError, Result};

/// Prefix a 5-field expression with a literal `0` seconds field
///
/// 6- and 7-field expressions pass through with whitespace collapsed.
///
/// # Errors
/// `LakeError::InvalidCron` for any other field count.
pub fn normalize(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(LakeError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 5, 6 or 7 fields, found {}", n),
        }),
    }
}

/// Normalize and parse into a schedule
///
/// # Errors
/// `LakeError::InvalidCron` when the field count or any field is invalid.
pub fn parse(expression: &str) -> Result<(String, Schedule)> {
    let normalized = normalize(expression)?;
    let schedule = Schedule::from_str(&normalized).map_err(|e| LakeError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })?;
    Ok((normalized, schedule))
}
