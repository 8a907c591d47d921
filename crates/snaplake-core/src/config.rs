//! Layered application configuration
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional TOML file (default `snaplake.toml`)
//! 3. `SNAPLAKE__*` environment variables, `__` separating nested keys
//!    (`SNAPLAKE__RECOVERY__STALE_THRESHOLD_MINUTES=60`)

use serde::Deserialize;
use snaplake_core_types::Sensitive;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{LakeError, Result};
use crate::logging_facility::Profile;

pub const DEFAULT_CONFIG_FILE: &str = "snaplake.toml";
pub const ENV_PREFIX: &str = "SNAPLAKE";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub profile: Profile,
    /// Metadata database file
    pub database_path: PathBuf,
    /// Secret for the credential cipher; required under `production`
    pub encryption_key: Option<Sensitive<String>>,
    /// Local cache for object-storage downloads
    pub cache_dir: PathBuf,
    pub recovery: RecoveryConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Seconds between stale sweeps
    pub interval_secs: u64,
    /// RUNNING snapshots older than this are considered orphaned
    pub stale_threshold_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            database_path: PathBuf::from("./data/snaplake.db"),
            encryption_key: None,
            cache_dir: PathBuf::from("./data/cache"),
            recovery: RecoveryConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            stale_threshold_minutes: 180,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load from `path` (or `snaplake.toml` if present) and the process environment
    ///
    /// # Errors
    /// `LakeError::Configuration` if a source cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as `load` with an explicit environment map instead of the process env
    ///
    /// # Errors
    /// `LakeError::Configuration` if a source cannot be parsed.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        // An explicitly named file must exist
        let required = path.is_some();

        let settings = config::Config::builder()
            .add_source(config::File::from(file).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .source(env),
            )
            .build()
            .map_err(|e| LakeError::Configuration {
                message: e.to_string(),
            })?;

        settings
            .try_deserialize()
            .map_err(|e| LakeError::Configuration {
                message: e.to_string(),
            })
    }

    pub fn recovery_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.recovery.interval_secs.max(1))
    }

    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.recovery.stale_threshold_minutes.max(1))
    }
}
