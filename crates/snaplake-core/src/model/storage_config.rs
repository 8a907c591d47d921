use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snaplake_core_types::Sensitive;
use std::fmt;
use std::str::FromStr;

use crate::errors::{LakeError, Result};

/// Where the lake lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageKind {
    Local,
    Object,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "LOCAL",
            StorageKind::Object => "OBJECT",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = LakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOCAL" => Ok(StorageKind::Local),
            "OBJECT" | "S3" => Ok(StorageKind::Object),
            _ => Err(LakeError::UnknownVariant {
                what: "storage kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Singleton storage configuration
///
/// `access_key` and `secret_key` hold sealed values once persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub local_path: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<Sensitive<String>>,
    pub secret_key: Option<Sensitive<String>>,
    pub updated_at: DateTime<Utc>,
}

impl StorageConfig {
    pub fn local(path: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            kind: StorageKind::Local,
            local_path: Some(path.into()),
            bucket: None,
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            updated_at: now,
        }
    }

    /// Check that the kind-specific fields are present
    ///
    /// # Errors
    /// `LakeError::Configuration` naming the missing field.
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str| LakeError::Configuration {
            message: format!("{} storage requires '{}'", self.kind, field),
        };
        let blank = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

        match self.kind {
            StorageKind::Local => {
                if blank(&self.local_path) {
                    return Err(missing("local_path"));
                }
            }
            StorageKind::Object => {
                if blank(&self.bucket) {
                    return Err(missing("bucket"));
                }
                if blank(&self.region) {
                    return Err(missing("region"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_requires_path() {
        let mut config = StorageConfig::local("./data/lake", Utc::now());
        assert!(config.validate().is_ok());
        config.local_path = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_object_requires_bucket_and_region() {
        let config = StorageConfig {
            kind: StorageKind::Object,
            local_path: None,
            bucket: Some("lake".to_string()),
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            updated_at: Utc::now(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_kind_parse_accepts_s3_alias() {
        assert_eq!("s3".parse::<StorageKind>().unwrap(), StorageKind::Object);
    }
}
