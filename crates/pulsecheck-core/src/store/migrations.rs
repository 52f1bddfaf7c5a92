//! Database schema migrations for pulsecheck.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration
//! version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current schema
/// version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or(0)
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// v1: status snapshots and the append-only activity feed.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_status (
            user_id          TEXT PRIMARY KEY,
            last_check_in    TEXT,
            next_due         TEXT,
            alert_level      INTEGER NOT NULL DEFAULT 0,
            alert_entered_at TEXT,
            version          INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS activities (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            seq         INTEGER NOT NULL,
            kind        TEXT NOT NULL,
            description TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            payload     TEXT NOT NULL,
            UNIQUE (user_id, seq)
        );

        -- Sweep selection and feed query patterns
        CREATE INDEX IF NOT EXISTS idx_user_status_next_due ON user_status(next_due);
        CREATE INDEX IF NOT EXISTS idx_activities_user_ts ON activities(user_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_activities_ts ON activities(timestamp);",
    )?;
    set_schema_version(conn, 1)
}
