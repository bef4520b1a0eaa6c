//! API tokens. One per user; logging in again hands back the same key.

use chrono::Utc;
use rand::RngCore;
use rusqlite::{params, OptionalExtension};

use poim_shared::UserId;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{AuthToken, User};
use crate::points::parse_timestamp;

/// Random bytes per token; hex-encoded to twice as many characters.
const TOKEN_BYTES: usize = 20;

impl Database {
    /// Return the user's token, creating one if needed.
    pub fn get_or_create_token(&self, user_id: UserId) -> Result<AuthToken> {
        if let Some(existing) = self.token_for_user(user_id)? {
            return Ok(existing);
        }

        let token = AuthToken {
            key: generate_key(),
            user_id,
            created_at: Utc::now(),
        };

        self.conn().execute(
            "INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token.key, token.user_id.0, token.created_at.to_rfc3339()],
        )?;

        tracing::debug!(user_id = %user_id, "auth token issued");
        Ok(token)
    }

    fn token_for_user(&self, user_id: UserId) -> Result<Option<AuthToken>> {
        let token = self
            .conn()
            .query_row(
                "SELECT key, user_id, created_at FROM auth_tokens WHERE user_id = ?1",
                params![user_id.0],
                row_to_token,
            )
            .optional()?;
        Ok(token)
    }

    /// Resolve a token key to its user.
    pub fn user_for_token(&self, key: &str) -> Result<User> {
        let user_id: i64 = self
            .conn()
            .query_row(
                "SELECT user_id FROM auth_tokens WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map_err(not_found)?;
        self.get_user(UserId(user_id))
    }

    /// Delete a token. Returns `true` if a row was deleted.
    pub fn delete_token(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM auth_tokens WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn row_to_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuthToken> {
    let created_str: String = row.get(2)?;
    Ok(AuthToken {
        key: row.get(0)?,
        user_id: UserId(row.get(1)?),
        created_at: parse_timestamp(2, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::NewUser;

    fn setup() -> (Database, UserId) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .create_user(&NewUser {
                username: "bob".into(),
                email: "bob@example.com".into(),
                first_name: "Bob".into(),
                last_name: "Smith".into(),
                password_hash: crate::accounts::hash_password("password bob").unwrap(),
            })
            .unwrap();
        (db, user.id)
    }

    #[test]
    fn token_is_stable_per_user() {
        let (db, user_id) = setup();
        let first = db.get_or_create_token(user_id).unwrap();
        let second = db.get_or_create_token(user_id).unwrap();

        assert_eq!(first.key, second.key);
        assert_eq!(first.key.len(), TOKEN_BYTES * 2);
        assert!(first.key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn token_resolves_to_user_until_deleted() {
        let (db, user_id) = setup();
        let token = db.get_or_create_token(user_id).unwrap();

        assert_eq!(db.user_for_token(&token.key).unwrap().id, user_id);

        assert!(db.delete_token(&token.key).unwrap());
        assert!(!db.delete_token(&token.key).unwrap());
        assert!(matches!(
            db.user_for_token(&token.key),
            Err(StoreError::NotFound)
        ));

        // A fresh login issues a new key.
        let renewed = db.get_or_create_token(user_id).unwrap();
        assert_ne!(renewed.key, token.key);
    }
}
