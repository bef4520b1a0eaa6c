//! The actor behind a request.
//!
//! A [`Principal`] is resolved once per request (from the auth token) and then
//! passed explicitly down the call chain. Nothing here is cached between
//! requests.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::CHANGE_POINT_CODENAME;
use crate::types::UserId;

// ---------------------------------------------------------------------------
// Permission
// ---------------------------------------------------------------------------

/// A named model permission that can be granted to a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    /// Edit, delete and undelete points owned by other users.
    #[serde(rename = "points.change_point")]
    ChangePoint,
}

impl Permission {
    pub fn codename(self) -> &'static str {
        match self {
            Permission::ChangePoint => CHANGE_POINT_CODENAME,
        }
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CHANGE_POINT_CODENAME => Ok(Permission::ChangePoint),
            other => Err(format!("unknown permission: {other}")),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.codename())
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// An authenticated user together with the flags the policy looks at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Explicitly granted permissions. Superusers implicitly hold all of them.
    pub permissions: BTreeSet<Permission>,
}

impl Account {
    /// A plain user with no moderation rights.
    pub fn regular(id: UserId) -> Self {
        Self {
            id,
            is_staff: false,
            is_superuser: false,
            permissions: BTreeSet::new(),
        }
    }

    pub fn has_perm(&self, perm: Permission) -> bool {
        self.is_superuser || self.permissions.contains(&perm)
    }
}

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(Account),
}

impl Principal {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::User(_))
    }

    pub fn account(&self) -> Option<&Account> {
        match self {
            Principal::User(account) => Some(account),
            Principal::Anonymous => None,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.account().map(|a| a.id)
    }
}

impl From<Account> for Principal {
    fn from(account: Account) -> Self {
        Principal::User(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superuser_holds_every_permission() {
        let mut account = Account::regular(UserId(1));
        assert!(!account.has_perm(Permission::ChangePoint));

        account.is_superuser = true;
        assert!(account.has_perm(Permission::ChangePoint));
    }

    #[test]
    fn permission_codename_parses_back() {
        let perm: Permission = "points.change_point".parse().unwrap();
        assert_eq!(perm, Permission::ChangePoint);
        assert!("points.delete_point".parse::<Permission>().is_err());
    }

    #[test]
    fn anonymous_has_no_user_id() {
        assert_eq!(Principal::Anonymous.user_id(), None);
        assert!(!Principal::Anonymous.is_authenticated());

        let principal = Principal::from(Account::regular(UserId(7)));
        assert_eq!(principal.user_id(), Some(UserId(7)));
    }
}
