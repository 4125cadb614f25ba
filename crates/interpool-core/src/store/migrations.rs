//! Database schema migrations for the SQLite store.
//!
//! Migrations are versioned and applied automatically on open; the
//! `schema_version` table tracks the current version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations.
///
/// # Errors
/// Returns an error if a migration statement fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;
    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| row.get::<_, i32>(0))
        .unwrap_or_else(|e| {
            if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                eprintln!("warning: failed to read schema_version: {e}");
            }
            0
        })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: baseline schema.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bookings (
            id INTEGER PRIMARY KEY,
            meeting_type TEXT NOT NULL,
            dr_type TEXT,
            time_start TEXT NOT NULL,
            time_end TEXT NOT NULL,
            room TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'waiting',
            assigned_interpreter TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_bookings_interpreter_time
            ON bookings (assigned_interpreter, time_start, time_end);
        CREATE INDEX IF NOT EXISTS idx_bookings_type_time
            ON bookings (meeting_type, time_start);

        CREATE TABLE IF NOT EXISTS interpreters (
            id TEXT PRIMARY KEY,
            active INTEGER NOT NULL DEFAULT 1,
            joined_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pool_entries (
            booking_id INTEGER PRIMARY KEY,
            meeting_type TEXT NOT NULL,
            time_start TEXT NOT NULL,
            time_end TEXT NOT NULL,
            mode TEXT NOT NULL,
            threshold_days INTEGER NOT NULL,
            deadline_time TEXT NOT NULL,
            pool_entry_time TEXT NOT NULL,
            processing_priority INTEGER NOT NULL,
            batch_id TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            state TEXT NOT NULL DEFAULT 'pending',
            leased_at TEXT,
            failed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS policy (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            body TEXT NOT NULL,
            generation INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS mode_thresholds (
            meeting_type TEXT NOT NULL,
            mode TEXT NOT NULL,
            urgent_threshold_days INTEGER NOT NULL,
            general_threshold_days INTEGER NOT NULL,
            priority_value INTEGER NOT NULL,
            PRIMARY KEY (meeting_type, mode)
        );

        CREATE TABLE IF NOT EXISTS roster_snapshot (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            body TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS assignment_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            booking_id INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;
    set_schema_version(conn, 1)
}
