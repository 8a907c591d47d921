use chrono::{DateTime, Utc};

/// Operator account created by system initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    /// PHC-format Argon2 hash
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            username: username.into(),
            password_hash: password_hash.into(),
            created_at: now,
        }
    }
}
