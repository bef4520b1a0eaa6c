//! Domain model structs persisted in the SQLite database.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use poim_shared::policy::Owned;
use poim_shared::{Account, Permission, PointId, UserId};

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// A geo-tagged bookmark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Point {
    /// Assigned on insert, never reused.
    pub id: PointId,
    /// The creating user. Permanent.
    pub owner_id: UserId,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Hidden from listings, still reachable by id.
    pub unlisted: bool,
    pub created_at: DateTime<Utc>,
    /// Tombstone. `None` means live.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Point {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl Owned for Point {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

/// Input for [`Database::insert_point`](crate::Database::insert_point).
#[derive(Debug, Clone, PartialEq)]
pub struct NewPoint {
    pub owner_id: UserId,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub unlisted: bool,
}

/// The mutable fields of a point. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointChanges {
    pub title: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub unlisted: Option<bool>,
}

impl PointChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.unlisted.is_none()
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// argon2 PHC string. Never leaves the server.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub permissions: BTreeSet<Permission>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether the stored hash can ever verify a password.
    pub fn has_usable_password(&self) -> bool {
        self.password_hash.starts_with('$')
    }

    /// The policy view of this user.
    pub fn account(&self) -> Account {
        Account {
            id: self.id,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
            permissions: self.permissions.clone(),
        }
    }
}

/// Input for [`Database::create_user`](crate::Database::create_user).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// argon2 PHC string from [`hash_password`](crate::accounts::hash_password).
    /// Hashing is left to the caller so it can run off the async runtime.
    pub password_hash: String,
}

/// Moderation flags that an administrator may change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    /// Replaces the whole permission set when present.
    pub permissions: Option<BTreeSet<Permission>>,
}

// ---------------------------------------------------------------------------
// Auth token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthToken {
    pub key: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Row counts reported by the admin status endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    pub users: i64,
    pub live_points: i64,
    pub deleted_points: i64,
}
