//! Serialization of list-valued columns
//!
//! Schemas, table allowlists, tags and primary-key lists are stored as text.
//! Repositories receive the codec explicitly rather than reaching for a
//! process-wide serializer.

use snaplake_core::errors::{ExError, ExErrorKind};

use crate::errors::Result;

pub trait ListCodec: Send + Sync {
    fn encode(&self, items: &[String]) -> Result<String>;
    fn decode(&self, raw: &str) -> Result<Vec<String>>;
}

/// JSON array encoding (`["a","b"]`)
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonListCodec;

impl ListCodec for JsonListCodec {
    fn encode(&self, items: &[String]) -> Result<String> {
        serde_json::to_string(items).map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op("encode_list")
                .with_message(e.to_string())
        })
    }

    fn decode(&self, raw: &str) -> Result<Vec<String>> {
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(raw).map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op("decode_list")
                .with_message(format!("Invalid list column '{}': {}", raw, e))
        })
    }
}
