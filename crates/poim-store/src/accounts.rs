//! User accounts, password hashing and moderation roles.

use std::collections::BTreeSet;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use poim_shared::{Permission, UserId};

use crate::database::Database;
use crate::error::{conflict_on_unique, not_found, Result, StoreError};
use crate::models::{NewUser, RoleChanges, User};
use crate::points::parse_timestamp;

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, is_staff, is_superuser, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Register a user. Usernames are unique as typed, emails are unique
    /// case-insensitively; either clash is a [`StoreError::Conflict`].
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let now = Utc::now();

        self.conn()
            .execute(
                "INSERT INTO users (username, email, first_name, last_name, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.username,
                    new.email,
                    new.first_name,
                    new.last_name,
                    new.password_hash,
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| conflict_on_unique(e, "user"))?;

        let id = UserId(self.conn().last_insert_rowid());
        tracing::info!(user_id = %id, username = %new.username, "user created");

        Ok(User {
            id,
            username: new.username.clone(),
            email: new.email.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            password_hash: new.password_hash.clone(),
            is_staff: false,
            is_superuser: false,
            permissions: BTreeSet::new(),
            created_at: now,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        let mut user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                row_to_user,
            )
            .map_err(not_found)?;
        user.permissions = self.user_permissions(user.id)?;
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        let mut user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .map_err(not_found)?;
        user.permissions = self.user_permissions(user.id)?;
        Ok(user)
    }

    /// Whether the username is taken, compared as typed.
    pub fn username_taken(&self, username: &str) -> Result<bool> {
        self.exists_where("username = ?1", username)
    }

    /// Whether the email is taken, compared case-insensitively.
    pub fn email_taken(&self, email: &str) -> Result<bool> {
        self.exists_where("email = ?1 COLLATE NOCASE", email)
    }

    fn exists_where(&self, predicate: &str, value: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                &format!("SELECT id FROM users WHERE {predicate} LIMIT 1"),
                params![value],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn user_permissions(&self, id: UserId) -> Result<BTreeSet<Permission>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT codename FROM user_permissions WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![id.0], |row| row.get::<_, String>(0))?;

        let mut permissions = BTreeSet::new();
        for row in rows {
            let codename = row?;
            match codename.parse::<Permission>() {
                Ok(perm) => {
                    permissions.insert(perm);
                }
                Err(_) => {
                    tracing::warn!(user_id = %id, codename = %codename, "ignoring unknown permission");
                }
            }
        }
        Ok(permissions)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Change moderation flags in one transaction and return the result.
    pub fn set_user_roles(&self, id: UserId, changes: &RoleChanges) -> Result<User> {
        let tx = self.conn().unchecked_transaction()?;

        let affected = tx.execute(
            "UPDATE users SET
                 is_staff     = COALESCE(?2, is_staff),
                 is_superuser = COALESCE(?3, is_superuser)
             WHERE id = ?1",
            params![id.0, changes.is_staff, changes.is_superuser],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        if let Some(ref permissions) = changes.permissions {
            tx.execute(
                "DELETE FROM user_permissions WHERE user_id = ?1",
                params![id.0],
            )?;
            for perm in permissions {
                tx.execute(
                    "INSERT INTO user_permissions (user_id, codename) VALUES (?1, ?2)",
                    params![id.0, perm.codename()],
                )?;
            }
        }

        tx.commit()?;
        self.get_user(id)
    }
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::PasswordHash(e.to_string()))
}

/// Check a password against a stored PHC string. Malformed hashes never
/// verify.
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    let hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(err) => {
            tracing::error!("failed to parse password hash: {}", err);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a row selected with `USER_COLUMNS`. Permissions are loaded separately.
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let created_str: String = row.get(8)?;

    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password_hash: row.get(5)?,
        is_staff: row.get(6)?,
        is_superuser: row.get(7)?,
        permissions: BTreeSet::new(),
        created_at: parse_timestamp(8, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            first_name: "First".into(),
            last_name: "Smith".into(),
            password_hash: hash_password(&format!("password {name}")).unwrap(),
        }
    }

    #[test]
    fn stored_hash_verifies_only_the_right_password() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice")).unwrap();

        let found = db.get_user_by_username("alice").unwrap();
        assert_eq!(found.id, alice.id);
        assert!(found.has_usable_password());
        assert!(verify_password(&found.password_hash, "password alice"));
        assert!(!verify_password(&found.password_hash, "wrong"));
        assert!(!verify_password("not a phc string", "password alice"));

        assert!(matches!(
            db.get_user_by_username("nobody"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn duplicate_username_or_email_conflicts() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("alice")).unwrap();

        let same_name = NewUser {
            email: "other@example.com".into(),
            ..new_user("alice")
        };
        assert!(matches!(db.create_user(&same_name), Err(StoreError::Conflict(_))));

        let same_email = NewUser {
            email: "ALICE@example.com".into(),
            ..new_user("alice2")
        };
        assert!(matches!(db.create_user(&same_email), Err(StoreError::Conflict(_))));

        assert!(db.username_taken("alice").unwrap());
        assert!(!db.username_taken("Alice").unwrap());
        assert!(db.email_taken("Alice@Example.com").unwrap());
        assert!(!db.email_taken("bob@example.com").unwrap());
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("alice")).unwrap();
        let upper = NewUser {
            email: "upper@example.com".into(),
            ..new_user("Alice")
        };
        assert!(db.create_user(&upper).is_ok());
    }

    #[test]
    fn roles_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let carol = db.create_user(&new_user("carol")).unwrap();

        let updated = db
            .set_user_roles(
                carol.id,
                &RoleChanges {
                    is_staff: Some(true),
                    permissions: Some([Permission::ChangePoint].into_iter().collect()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.is_staff);
        assert!(!updated.is_superuser);
        assert!(updated.account().has_perm(Permission::ChangePoint));

        // Leaving permissions out keeps them.
        let updated = db
            .set_user_roles(
                carol.id,
                &RoleChanges {
                    is_superuser: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.is_staff && updated.is_superuser);
        assert!(updated.permissions.contains(&Permission::ChangePoint));

        // An empty set revokes.
        let updated = db
            .set_user_roles(
                carol.id,
                &RoleChanges {
                    permissions: Some(BTreeSet::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.permissions.is_empty());
    }

    #[test]
    fn roles_for_unknown_user_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.set_user_roles(UserId(99), &RoleChanges::default()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("not-a-phc-string", "anything"));
    }
}
