//! Response shapes.
//!
//! `can_edit` is derived from the same policy rule that gates writes, for
//! the principal of the current request only.

use serde::{Deserialize, Serialize};

use poim_shared::{policy, PointId, Principal, UserId};
use poim_store::{Point, User};

/// A point as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointView {
    pub id: PointId,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub unlisted: bool,
    pub can_edit: bool,
}

impl PointView {
    pub fn new(point: &Point, principal: &Principal) -> Self {
        Self {
            id: point.id,
            title: point.title.clone(),
            latitude: point.latitude,
            longitude: point.longitude,
            unlisted: point.unlisted,
            can_edit: policy::can_update(principal, point),
        }
    }

    pub fn all(points: &[Point], principal: &Principal) -> Vec<Self> {
        points.iter().map(|p| Self::new(p, principal)).collect()
    }
}

/// The caller's own profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub has_usable_password: bool,
}

impl From<&User> for ProfileView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            has_usable_password: user.has_usable_password(),
        }
    }
}

/// Body of a successful register or login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthView {
    pub profile: ProfileView,
    pub auth_token: String,
}

/// Moderation flags of a user, as returned by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolesView {
    pub id: UserId,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub permissions: Vec<String>,
}

impl From<&User> for RolesView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            permissions: user
                .permissions
                .iter()
                .map(|p| p.codename().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use poim_shared::Account;

    use super::*;

    fn point(owner: i64) -> Point {
        Point {
            id: PointId(1),
            owner_id: UserId(owner),
            title: "My point".into(),
            latitude: 59.876364,
            longitude: 30.32522,
            unlisted: false,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn can_edit_is_per_principal() {
        let p = point(1);
        let owner = Principal::User(Account::regular(UserId(1)));
        let stranger = Principal::User(Account::regular(UserId(2)));

        assert!(PointView::new(&p, &owner).can_edit);
        assert!(!PointView::new(&p, &stranger).can_edit);
        assert!(!PointView::new(&p, &Principal::Anonymous).can_edit);
    }

    #[test]
    fn serialized_shape() {
        let view = PointView::new(&point(1), &Principal::Anonymous);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "title": "My point",
                "latitude": 59.876364,
                "longitude": 30.32522,
                "unlisted": false,
                "can_edit": false,
            })
        );
    }

    #[test]
    fn profile_reports_usable_password() {
        let mut user = User {
            id: UserId(7),
            username: "alice".into(),
            email: "alice@example.com".into(),
            first_name: "Alice".into(),
            last_name: "Smith".into(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
            is_staff: false,
            is_superuser: false,
            permissions: Default::default(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(ProfileView::from(&user)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "username": "alice",
                "email": "alice@example.com",
                "first_name": "Alice",
                "last_name": "Smith",
                "has_usable_password": true,
            })
        );

        user.password_hash = "!".into();
        assert!(!ProfileView::from(&user).has_usable_password);
    }
}
