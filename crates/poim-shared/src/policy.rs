//! Authorization policy for points.
//!
//! Two entry points:
//! - [`check_class`] answers before the target point is loaded
//!   (coarse-grained).
//! - [`check_instance`] answers for a concrete point (fine-grained).
//!
//! Both are pure functions of `(principal, action, resource)`. The same
//! [`can_update`] rule backs update, delete, undelete and the `can_edit`
//! flag in responses.

use serde::{Deserialize, Serialize};

use crate::principal::{Permission, Principal};
use crate::types::UserId;

/// Operations on the point resource. The set is closed: anything else is a
/// routing mistake, not a policy outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Undelete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Undelete => "undelete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    /// Coarse check passed; the final answer needs the instance.
    Defer,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// A resource with a permanent owner.
pub trait Owned {
    fn owner_id(&self) -> UserId;
}

impl Owned for UserId {
    fn owner_id(&self) -> UserId {
        *self
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Whether `principal` may create new points.
pub fn can_create(principal: &Principal) -> bool {
    let Some(account) = principal.account() else {
        return false;
    };

    if account.is_superuser {
        return true;
    }

    // Per-user creation bans would go here.
    true
}

/// Whether `principal` may change `resource`. Evaluated in order:
/// anonymous, superuser, staff with `points.change_point`, owner.
pub fn can_update<R: Owned + ?Sized>(principal: &Principal, resource: &R) -> bool {
    let Some(account) = principal.account() else {
        return false;
    };

    if account.is_superuser {
        return true;
    }

    if account.is_staff && account.has_perm(Permission::ChangePoint) {
        return true;
    }

    account.id == resource.owner_id()
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Coarse-grained check, before the target instance is known.
pub fn check_class(principal: &Principal, action: Action) -> Decision {
    match action {
        Action::Read => Decision::Allow,
        Action::Create => Decision::from_bool(can_create(principal)),
        Action::Update | Action::Delete | Action::Undelete => Decision::Defer,
    }
}

/// Fine-grained check against a concrete resource. Never returns
/// [`Decision::Defer`].
pub fn check_instance<R: Owned + ?Sized>(
    principal: &Principal,
    action: Action,
    resource: &R,
) -> Decision {
    match action {
        Action::Read => Decision::Allow,
        Action::Create => Decision::from_bool(can_create(principal)),
        Action::Update | Action::Delete | Action::Undelete => {
            Decision::from_bool(can_update(principal, resource))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::principal::Account;

    const OWNER: UserId = UserId(1);
    const MUTATIONS: [Action; 3] = [Action::Update, Action::Delete, Action::Undelete];

    fn user(id: i64, is_staff: bool, is_superuser: bool, change_perm: bool) -> Principal {
        let mut permissions = BTreeSet::new();
        if change_perm {
            permissions.insert(Permission::ChangePoint);
        }
        Principal::User(Account {
            id: UserId(id),
            is_staff,
            is_superuser,
            permissions,
        })
    }

    #[test]
    fn read_is_always_allowed() {
        assert_eq!(check_class(&Principal::Anonymous, Action::Read), Decision::Allow);
        assert_eq!(
            check_instance(&Principal::Anonymous, Action::Read, &OWNER),
            Decision::Allow
        );
    }

    #[test]
    fn create_requires_authentication() {
        assert_eq!(check_class(&Principal::Anonymous, Action::Create), Decision::Deny);
        assert_eq!(check_class(&user(2, false, false, false), Action::Create), Decision::Allow);
        assert_eq!(check_class(&user(3, false, true, false), Action::Create), Decision::Allow);
    }

    #[test]
    fn mutations_defer_to_instance_check() {
        for action in MUTATIONS {
            assert_eq!(check_class(&Principal::Anonymous, action), Decision::Defer);
            assert_eq!(check_class(&user(2, false, false, false), action), Decision::Defer);
        }
    }

    #[test]
    fn instance_rule_table() {
        // (principal, expected) for a point owned by OWNER.
        let cases = [
            (Principal::Anonymous, false),
            (user(1, false, false, false), true),  // owner
            (user(2, false, false, false), false), // stranger
            (user(3, true, false, true), true),    // staff with permission
            (user(4, true, false, false), false),  // staff without permission
            (user(5, false, false, true), false),  // permission without staff
            (user(6, false, true, false), true),   // superuser
        ];

        for action in MUTATIONS {
            for (principal, expected) in &cases {
                let decision = check_instance(principal, action, &OWNER);
                assert_eq!(
                    decision.is_allowed(),
                    *expected,
                    "{action} by {principal:?}"
                );
                assert_ne!(decision, Decision::Defer);
            }
        }
    }

    #[test]
    fn can_edit_matches_update_decision() {
        let principal = user(3, true, false, true);
        assert_eq!(
            can_update(&principal, &OWNER),
            check_instance(&principal, Action::Update, &OWNER).is_allowed()
        );
    }
}
