//! First-run initialization and operator authentication

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use ring::rand::{SecureRandom, SystemRandom};
use snaplake_core::clock::Clock;
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::{StorageConfig, User};
use snaplake_core::{log_op_end, log_op_error, log_op_start};
use snaplake_core_types::Sensitive;
use snaplake_store::repo::{StorageConfigRepository, UserRepository};
use std::sync::Arc;
use std::time::Instant;

use crate::errors::{internal, Result};

pub const DEFAULT_LAKE_PATH: &str = "./data/lake";

pub struct SystemSetup {
    users: Arc<dyn UserRepository>,
    storage_configs: Arc<dyn StorageConfigRepository>,
    clock: Arc<dyn Clock>,
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut salt_bytes)
        .map_err(|_| internal("hash_password", "failed to generate salt"))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| internal("hash_password", e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| internal("hash_password", e.to_string()))
}

fn invalid_credentials() -> ExError {
    ExError::new(ExErrorKind::InvalidCredentials)
        .with_op("authenticate")
        .with_message("Invalid username or password")
}

impl SystemSetup {
    pub fn new(
        users: Arc<dyn UserRepository>,
        storage_configs: Arc<dyn StorageConfigRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            storage_configs,
            clock,
        }
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.users.count()? > 0)
    }

    /// Create the operator account and a LOCAL storage configuration
    ///
    /// # Errors
    /// `SystemAlreadyInitialized` once any user exists; `InvalidInput` for a
    /// blank username or password.
    pub fn initialize(
        &self,
        username: &str,
        password: &Sensitive<String>,
        storage_path: Option<&str>,
    ) -> Result<User> {
        let start = Instant::now();
        log_op_start!("initialize_system", username = username);

        let result = self.initialize_inner(username, password, storage_path);
        match &result {
            Ok(user) => {
                log_op_end!(
                    "initialize_system",
                    duration_ms = start.elapsed().as_millis() as u64,
                    user_id = user.id.as_str()
                );
            }
            Err(e) => {
                log_op_error!(
                    "initialize_system",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
            }
        }
        result
    }

    fn initialize_inner(
        &self,
        username: &str,
        password: &Sensitive<String>,
        storage_path: Option<&str>,
    ) -> Result<User> {
        if self.is_initialized()? {
            return Err(ExError::new(ExErrorKind::SystemAlreadyInitialized)
                .with_op("initialize_system")
                .with_message("System is already initialized"));
        }
        let username = username.trim();
        if username.is_empty() || password.expose().is_empty() {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("initialize_system")
                .with_message("Username and password must not be empty"));
        }

        let now = self.clock.now();
        let path = storage_path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_LAKE_PATH);
        let storage = StorageConfig::local(path, now);
        storage.validate().map_err(ExError::from)?;

        let user = User::new(username, hash_password(password.expose())?, now);
        self.users.save(&user)?;
        self.storage_configs.save(&storage)?;
        Ok(user)
    }

    /// # Errors
    /// `InvalidCredentials` for an unknown user or a wrong password.
    pub fn authenticate(&self, username: &str, password: &Sensitive<String>) -> Result<User> {
        let user = self
            .users
            .find_by_username(username.trim())?
            .ok_or_else(invalid_credentials)?;
        let parsed = PasswordHash::new(&user.password_hash)
            .map_err(|e| internal("authenticate", e.to_string()))?;
        Argon2::default()
            .verify_password(password.expose().as_bytes(), &parsed)
            .map_err(|_| invalid_credentials())?;
        Ok(user)
    }
}
