use rusqlite::Connection;

const UP_SQL: &str = r#"
-- One API token per user
CREATE TABLE IF NOT EXISTS auth_tokens (
    key        TEXT PRIMARY KEY NOT NULL,   -- 40 hex chars
    user_id    INTEGER NOT NULL UNIQUE,     -- FK -> users(id)
    created_at TEXT NOT NULL,               -- ISO-8601

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
