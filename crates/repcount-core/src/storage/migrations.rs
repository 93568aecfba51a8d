//! Database schema migrations for repcount.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
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

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: workout catalogue and history.
///
/// - exercises / set_variants: the exercise catalogue with ordered set variants
/// - day_slots / day_slot_exercises: a planned workout and its exercises
/// - history: one row per committed weight change
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS exercises (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL,
            muscle_group TEXT NOT NULL DEFAULT '',
            notes        TEXT NOT NULL DEFAULT '',
            image        TEXT
        );

        CREATE TABLE IF NOT EXISTS set_variants (
            exercise_id INTEGER NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            series      INTEGER NOT NULL,
            reps        INTEGER NOT NULL,
            weight_kg   REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (exercise_id, position)
        );

        CREATE TABLE IF NOT EXISTS day_slots (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS day_slot_exercises (
            day_slot_id INTEGER NOT NULL REFERENCES day_slots(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            exercise_id INTEGER NOT NULL REFERENCES exercises(id),
            set_index   INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (day_slot_id, position)
        );

        CREATE TABLE IF NOT EXISTS history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            exercise_id INTEGER NOT NULL REFERENCES exercises(id),
            series      INTEGER NOT NULL,
            reps        INTEGER NOT NULL,
            weight_kg   REAL NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_exercise ON history(exercise_id, recorded_at);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: journal of armed alarms, replayed on startup.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS armed_alarms (
            id      INTEGER PRIMARY KEY,
            kind    TEXT NOT NULL,
            fire_at TEXT NOT NULL,
            seq     INTEGER NOT NULL
        );",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}
