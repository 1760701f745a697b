//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: roster and raw records
    r#"
    -- ============================================
    -- Roster
    -- ============================================

    CREATE TABLE IF NOT EXISTS members (
        id          TEXT PRIMARY KEY,
        role        TEXT NOT NULL,
        firstname   TEXT NOT NULL,
        lastname    TEXT NOT NULL,
        gender      TEXT,
        birth_date  DATE,
        is_active   INTEGER NOT NULL DEFAULT 1,
        created_at  DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS courses (
        id          TEXT PRIMARY KEY,
        teacher_id  TEXT NOT NULL REFERENCES members(id),
        subject     TEXT NOT NULL,
        created_at  DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS enrollments (
        course_id   TEXT NOT NULL REFERENCES courses(id),
        student_id  TEXT NOT NULL REFERENCES members(id),
        PRIMARY KEY (course_id, student_id)
    );

    -- ============================================
    -- Raw records (append-only; edits supersede)
    -- ============================================

    CREATE TABLE IF NOT EXISTS attendance_records (
        id          TEXT PRIMARY KEY,
        student_id  TEXT NOT NULL REFERENCES members(id),
        course_id   TEXT NOT NULL REFERENCES courses(id),
        date        DATE NOT NULL,
        present     INTEGER NOT NULL,
        comment     TEXT,
        created_at  DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS behavior_records (
        id          TEXT PRIMARY KEY,
        student_id  TEXT NOT NULL REFERENCES members(id),
        course_id   TEXT NOT NULL REFERENCES courses(id),
        date        DATE NOT NULL,
        rating      INTEGER NOT NULL,
        comment     TEXT,
        created_at  DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS grade_records (
        id          TEXT PRIMARY KEY,
        student_id  TEXT NOT NULL REFERENCES members(id),
        course_id   TEXT NOT NULL REFERENCES courses(id),
        date        DATE NOT NULL,
        value       REAL NOT NULL,
        subject     TEXT NOT NULL,
        is_absent   INTEGER NOT NULL DEFAULT 0,
        is_draft    INTEGER NOT NULL DEFAULT 0,
        created_at  DATETIME NOT NULL
    );
    "#,
    // Version 2: indexes for per-student and date-range queries
    r#"
    CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance_records(student_id, date);
    CREATE INDEX IF NOT EXISTS idx_attendance_date    ON attendance_records(date);
    CREATE INDEX IF NOT EXISTS idx_behavior_student   ON behavior_records(student_id, date);
    CREATE INDEX IF NOT EXISTS idx_behavior_date      ON behavior_records(date);
    CREATE INDEX IF NOT EXISTS idx_grades_student     ON grade_records(student_id, date);
    CREATE INDEX IF NOT EXISTS idx_members_role       ON members(role, is_active);
    "#,
];

/// Run any pending migrations on the given connection.
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
