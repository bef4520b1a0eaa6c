//! Point lifecycle: create, retrieve, list, update, soft-delete, undelete.
//!
//! Every operation takes the requesting [`Principal`] explicitly. Order of
//! checks for instance operations: load the point (404), fine-grained
//! permission (401/403), then read and validate the body (400). Bodies are
//! handed over still unparsed (`Result<PointDraft, _>`) so a broken body
//! never hides a 404 or a 403.

use tracing::{debug, info};

use poim_shared::policy::{self, Action, Decision};
use poim_shared::{GeoFilter, PointId, Principal};
use poim_store::{Database, Point, PointChanges};

use crate::error::ServerError;
use crate::payload::PointDraft;

/// How an update body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// `PUT`: every field is required and (re)validated.
    Replace,
    /// `PATCH`: only supplied fields change.
    Partial,
}

/// A point body as read from the request, or the reason it could not be.
pub type Body = Result<PointDraft, ServerError>;

pub struct PointService<'a> {
    db: &'a Database,
}

impl<'a> PointService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, principal: &Principal, draft: Body) -> Result<Point, ServerError> {
        ensure_class(principal, Action::Create)?;
        let Some(owner_id) = principal.user_id() else {
            return Err(ServerError::Unauthenticated);
        };

        let fields = draft?.validate_full()?;
        let point = self.db.insert_point(&fields.into_new_point(owner_id))?;

        info!(point_id = %point.id, owner_id = %owner_id, "point created");
        Ok(point)
    }

    pub fn retrieve(&self, principal: &Principal, id: PointId) -> Result<Point, ServerError> {
        ensure_class(principal, Action::Read)?;
        Ok(self.db.get_live_point(id)?)
    }

    pub fn list(
        &self,
        principal: &Principal,
        geo: Option<&GeoFilter>,
    ) -> Result<Vec<Point>, ServerError> {
        ensure_class(principal, Action::Read)?;
        Ok(self.db.list_public_points(geo)?)
    }

    pub fn update(
        &self,
        principal: &Principal,
        id: PointId,
        draft: Body,
        mode: UpdateMode,
    ) -> Result<Point, ServerError> {
        ensure_class(principal, Action::Update)?;
        let point = self.db.get_live_point(id)?;
        ensure_instance(principal, Action::Update, &point)?;

        let changes: PointChanges = match mode {
            UpdateMode::Replace => draft?.validate_full()?.into_changes(),
            UpdateMode::Partial => draft?.validate_partial()?,
        };
        if changes.is_empty() {
            return Ok(point);
        }

        let updated = self.db.update_point_fields(id, &changes)?;
        info!(point_id = %id, by = ?principal.user_id(), ?mode, "point updated");
        Ok(updated)
    }

    pub fn delete(&self, principal: &Principal, id: PointId) -> Result<(), ServerError> {
        ensure_class(principal, Action::Delete)?;
        let point = self.db.get_live_point(id)?;
        ensure_instance(principal, Action::Delete, &point)?;

        self.db.soft_delete_point(id)?;
        info!(point_id = %id, by = ?principal.user_id(), "point soft-deleted");
        Ok(())
    }

    /// Restore a tombstoned point. A live or unknown point is `NotFound`
    /// either way, so callers cannot tell the two apart.
    pub fn undelete(&self, principal: &Principal, id: PointId) -> Result<Point, ServerError> {
        ensure_class(principal, Action::Undelete)?;
        let point = self.db.get_any_point(id)?;
        if point.is_live() {
            return Err(ServerError::NotFound);
        }
        ensure_instance(principal, Action::Undelete, &point)?;

        let restored = self.db.undelete_point(id)?;
        info!(point_id = %id, by = ?principal.user_id(), "point undeleted");
        Ok(restored)
    }
}

// ---------------------------------------------------------------------------
// Policy glue
// ---------------------------------------------------------------------------

fn ensure_class(principal: &Principal, action: Action) -> Result<(), ServerError> {
    match policy::check_class(principal, action) {
        Decision::Allow | Decision::Defer => Ok(()),
        Decision::Deny => Err(denied(principal, action)),
    }
}

fn ensure_instance(principal: &Principal, action: Action, point: &Point) -> Result<(), ServerError> {
    if policy::check_instance(principal, action, point).is_allowed() {
        Ok(())
    } else {
        Err(denied(principal, action))
    }
}

/// Anonymous callers get 401 so they know to log in; everyone else 403.
fn denied(principal: &Principal, action: Action) -> ServerError {
    debug!(%action, user_id = ?principal.user_id(), "policy denied");
    if principal.is_authenticated() {
        ServerError::Forbidden(format!("You do not have permission to {action} this point"))
    } else {
        ServerError::Unauthenticated
    }
}
