//! v001 -- Initial schema creation.
//!
//! Creates `users`, `user_permissions` and `points`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    password_hash TEXT NOT NULL,              -- argon2 PHC string
    is_staff      INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    is_superuser  INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    created_at    TEXT NOT NULL               -- ISO-8601 / RFC-3339
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(email COLLATE NOCASE);

-- ----------------------------------------------------------------
-- Granted model permissions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_permissions (
    user_id  INTEGER NOT NULL,
    codename TEXT NOT NULL,                   -- e.g. points.change_point

    PRIMARY KEY (user_id, codename),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Points
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS points (
    id         INTEGER PRIMARY KEY AUTOINCREMENT, -- never reused
    owner_id   INTEGER NOT NULL,                  -- FK -> users(id)
    title      TEXT NOT NULL,
    latitude   REAL NOT NULL,
    longitude  REAL NOT NULL,
    unlisted   INTEGER NOT NULL DEFAULT 0,        -- boolean 0/1
    created_at TEXT NOT NULL,
    deleted_at TEXT,                              -- NULL = live, else tombstone

    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_points_owner ON points(owner_id);
CREATE INDEX IF NOT EXISTS idx_points_created_at ON points(created_at);
CREATE INDEX IF NOT EXISTS idx_points_unlisted ON points(unlisted);
CREATE INDEX IF NOT EXISTS idx_points_deleted_at ON points(deleted_at);
CREATE INDEX IF NOT EXISTS idx_points_latitude ON points(latitude);
CREATE INDEX IF NOT EXISTS idx_points_longitude ON points(longitude);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
