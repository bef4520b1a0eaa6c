//! Point storage with soft-delete.
//!
//! Liveness is decided in exactly one place: the [`LIVE`] SQL fragment (and
//! its in-memory twin [`Point::is_live`]). Tombstoned rows are never removed
//! by normal operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use poim_shared::{GeoFilter, PointId, UserId};

use crate::database::{Database, GEODESIC_DISTANCE_FN};
use crate::error::{not_found, Result, StoreError};
use crate::models::{NewPoint, Point, PointChanges, StoreStats};

/// SQL predicate selecting live rows.
const LIVE: &str = "deleted_at IS NULL";

const POINT_COLUMNS: &str =
    "id, owner_id, title, latitude, longitude, unlisted, created_at, deleted_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new point. The store assigns `id` and `created_at`.
    pub fn insert_point(&self, new: &NewPoint) -> Result<Point> {
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO points (owner_id, title, latitude, longitude, unlisted, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.owner_id.0,
                new.title,
                new.latitude,
                new.longitude,
                new.unlisted,
                now.to_rfc3339(),
            ],
        )?;

        let id = PointId(self.conn().last_insert_rowid());
        tracing::debug!(point_id = %id, owner_id = %new.owner_id, "point inserted");

        Ok(Point {
            id,
            owner_id: new.owner_id,
            title: new.title.clone(),
            latitude: new.latitude,
            longitude: new.longitude,
            unlisted: new.unlisted,
            created_at: now,
            deleted_at: None,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a live point. Tombstoned and unknown ids are both `NotFound`.
    pub fn get_live_point(&self, id: PointId) -> Result<Point> {
        self.conn()
            .query_row(
                &format!("SELECT {POINT_COLUMNS} FROM points WHERE id = ?1 AND {LIVE}"),
                params![id.0],
                row_to_point,
            )
            .map_err(not_found)
    }

    /// Fetch a point regardless of its tombstone. Only the undelete path
    /// should need this.
    pub fn get_any_point(&self, id: PointId) -> Result<Point> {
        self.conn()
            .query_row(
                &format!("SELECT {POINT_COLUMNS} FROM points WHERE id = ?1"),
                params![id.0],
                row_to_point,
            )
            .map_err(not_found)
    }

    /// Live, listed points, newest id first, optionally restricted to a
    /// geographic radius.
    pub fn list_public_points(&self, geo: Option<&GeoFilter>) -> Result<Vec<Point>> {
        let mut points = Vec::new();

        match geo {
            None => {
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {POINT_COLUMNS} FROM points
                     WHERE unlisted = 0 AND {LIVE}
                     ORDER BY id DESC"
                ))?;
                let rows = stmt.query_map([], row_to_point)?;
                for row in rows {
                    points.push(row?);
                }
            }
            Some(filter) => {
                // Planar circle in degree space first, then the exact
                // great-circle distance.
                let mut stmt = self.conn().prepare(&format!(
                    "SELECT {POINT_COLUMNS} FROM points
                     WHERE unlisted = 0 AND {LIVE}
                       AND (latitude - ?1) * (latitude - ?1)
                         + (longitude - ?2) * (longitude - ?2) <= ?3 * ?3
                       AND {GEODESIC_DISTANCE_FN}(latitude, longitude, ?1, ?2) <= ?4
                     ORDER BY id DESC"
                ))?;
                let rows = stmt.query_map(
                    params![
                        filter.latitude,
                        filter.longitude,
                        filter.planar_radius_deg(),
                        filter.radius_m,
                    ],
                    row_to_point,
                )?;
                for row in rows {
                    points.push(row?);
                }
            }
        }

        Ok(points)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply `changes` to a live point in one statement and return the
    /// stored result. `NotFound` if the point is missing or tombstoned.
    pub fn update_point_fields(&self, id: PointId, changes: &PointChanges) -> Result<Point> {
        let affected = self.conn().execute(
            &format!(
                "UPDATE points SET
                     title     = COALESCE(?2, title),
                     latitude  = COALESCE(?3, latitude),
                     longitude = COALESCE(?4, longitude),
                     unlisted  = COALESCE(?5, unlisted)
                 WHERE id = ?1 AND {LIVE}"
            ),
            params![
                id.0,
                changes.title,
                changes.latitude,
                changes.longitude,
                changes.unlisted,
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        self.get_live_point(id)
    }

    // ------------------------------------------------------------------
    // Soft-delete
    // ------------------------------------------------------------------

    /// Tombstone a live point. `NotFound` if it was already gone.
    pub fn soft_delete_point(&self, id: PointId) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let affected = self.conn().execute(
            &format!("UPDATE points SET deleted_at = ?2 WHERE id = ?1 AND {LIVE}"),
            params![id.0, now.to_rfc3339()],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(now)
    }

    /// Clear the tombstone. `NotDeleted` if the point is live, `NotFound`
    /// if it never existed.
    pub fn undelete_point(&self, id: PointId) -> Result<Point> {
        let affected = self.conn().execute(
            &format!("UPDATE points SET deleted_at = NULL WHERE id = ?1 AND NOT ({LIVE})"),
            params![id.0],
        )?;

        if affected == 0 {
            let exists: Option<i64> = self
                .conn()
                .query_row("SELECT id FROM points WHERE id = ?1", params![id.0], |row| {
                    row.get(0)
                })
                .optional()?;
            return Err(match exists {
                Some(_) => StoreError::NotDeleted,
                None => StoreError::NotFound,
            });
        }

        self.get_live_point(id)
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    pub fn stats(&self) -> Result<StoreStats> {
        let stats = self.conn().query_row(
            &format!(
                "SELECT
                     (SELECT COUNT(*) FROM users),
                     (SELECT COUNT(*) FROM points WHERE {LIVE}),
                     (SELECT COUNT(*) FROM points WHERE NOT ({LIVE}))"
            ),
            [],
            |row| {
                Ok(StoreStats {
                    users: row.get(0)?,
                    live_points: row.get(1)?,
                    deleted_points: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an RFC 3339 column into UTC.
pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Map a `rusqlite::Row` selected with `POINT_COLUMNS` to a [`Point`].
fn row_to_point(row: &rusqlite::Row<'_>) -> rusqlite::Result<Point> {
    let created_str: String = row.get(6)?;
    let deleted_str: Option<String> = row.get(7)?;

    Ok(Point {
        id: PointId(row.get(0)?),
        owner_id: UserId(row.get(1)?),
        title: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        unlisted: row.get(5)?,
        created_at: parse_timestamp(6, &created_str)?,
        deleted_at: deleted_str
            .map(|s| parse_timestamp(7, &s))
            .transpose()?,
    })
}
