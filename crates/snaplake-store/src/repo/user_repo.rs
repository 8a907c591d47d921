//! SQLite user repository

use rusqlite::OptionalExtension;
use snaplake_core::errors::{ExError, ExErrorKind};
use snaplake_core::model::User;

use super::{is_constraint_violation, ts_from_db, ts_to_db, UserRepository};
use crate::db::Database;
use crate::errors::{from_rusqlite, Result};

pub struct SqliteUserRepo {
    db: Database,
}

impl SqliteUserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl UserRepository for SqliteUserRepo {
    fn count(&self) -> Result<usize> {
        self.db.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                .map_err(from_rusqlite)?;
            Ok(n.max(0) as usize)
        })
    }

    fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let row: Option<(String, String, String, i64)> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                [username],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(from_rusqlite)
        })?;

        row.map(|(id, username, password_hash, created_at)| {
            Ok(User {
                id,
                username,
                password_hash,
                created_at: ts_from_db(created_at)?,
            })
        })
        .transpose()
    }

    fn save(&self, user: &User) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET password_hash = excluded.password_hash",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.password_hash,
                    ts_to_db(&user.created_at),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    ExError::new(ExErrorKind::AlreadyExists)
                        .with_op("save_user")
                        .with_entity_id(user.username.clone())
                        .with_message(format!("User '{}' already exists", user.username))
                } else {
                    from_rusqlite(e)
                }
            })?;
            Ok(())
        })
    }
}
