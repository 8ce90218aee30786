use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use taskpilot_common::{Error, Result, UserId};
use tracing::info;

use crate::parse_timestamp;

/// Registered user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent storage for user accounts.
pub struct UserStore {
    conn: Connection,
}

impl UserStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening user store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email
                    ON users(email);",
            )
            .map_err(|e| Error::Database(format!("user migration failed: {e}")))?;
        Ok(())
    }

    /// Insert a new account. Email uniqueness is enforced by the schema and
    /// surfaced as a validation error.
    pub fn create(&self, email: &str, password_hash: &str) -> Result<User> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::Validation("invalid email address".to_string()));
        }

        let user = User {
            id: UserId::new(),
            email,
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO users (id, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id.as_str(),
                    user.email,
                    user.password_hash,
                    user.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint") {
                    Error::Validation("email is already registered".to_string())
                } else {
                    Error::Database(format!("failed to insert user: {e}"))
                }
            })?;

        Ok(user)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_where("email = ?1", &email.trim().to_ascii_lowercase())
    }

    pub fn find_by_id(&self, user_id: &UserId) -> Result<Option<User>> {
        self.find_where("id = ?1", user_id.as_str())
    }

    fn find_where(&self, predicate: &str, value: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT id, email, password_hash, created_at FROM users WHERE {predicate}"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare user query: {e}")))?;

        let mut rows = stmt
            .query_map(params![value], |row| {
                let id: String = row.get(0)?;
                let created_raw: String = row.get(3)?;
                Ok(User {
                    id: UserId::from(id),
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    created_at: parse_timestamp(&created_raw),
                })
            })
            .map_err(|e| Error::Database(format!("failed to find user: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| {
                Error::Database(format!("failed to read user row: {e}"))
            })?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UserStore;
    use taskpilot_common::UserId;

    #[test]
    fn create_and_find_round_trip() {
        let store = UserStore::in_memory().expect("in-memory store should open");
        let user = store
            .create("Alice@Example.com", "hash-1")
            .expect("user create should succeed");

        // Emails are normalized to lowercase.
        assert_eq!(user.email, "alice@example.com");

        let by_email = store
            .find_by_email("alice@example.com")
            .unwrap()
            .expect("email lookup should find the user");
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.password_hash, "hash-1");

        let by_id = store.find_by_id(&user.id).unwrap().expect("id lookup");
        assert_eq!(by_id.email, "alice@example.com");

        assert!(store.find_by_id(&UserId::new()).unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let store = UserStore::in_memory().expect("in-memory store should open");
        store.create("dup@example.com", "h1").unwrap();

        let err = store
            .create("dup@example.com", "h2")
            .expect_err("second registration should fail");
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn malformed_email_is_rejected() {
        let store = UserStore::in_memory().expect("in-memory store should open");
        assert!(store.create("not-an-email", "h").is_err());
        assert!(store.create("  ", "h").is_err());
    }
}
