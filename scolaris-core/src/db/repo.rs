//! Database repository layer
//!
//! Provides query and insert operations for the roster and the raw
//! attendance/behavior/grade records. All aggregation happens above
//! this layer; the repository never derives statistics itself.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// Generate a fresh record id.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// SQLite-backed record store.
///
/// The connection is behind a `Mutex` so the store can be shared across
/// the tokio blocking pool; statements are short-lived and the lock is
/// never held across I/O boundaries other than the query itself.
pub struct Database {
    conn: Mutex<Connection>,
}

fn parse_date(field: &'static str, row: &Row) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(field)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Roster operations
    // ============================================

    /// Insert or update a roster member
    pub fn upsert_member(&self, member: &Member) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO members (id, role, firstname, lastname, gender, birth_date, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                role = excluded.role,
                firstname = excluded.firstname,
                lastname = excluded.lastname,
                gender = excluded.gender,
                birth_date = excluded.birth_date,
                is_active = excluded.is_active
            "#,
            params![
                member.id,
                member.role.as_str(),
                member.firstname,
                member.lastname,
                member.gender.map(|g| g.as_str()),
                member.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
                member.is_active,
                member.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a member by id (active or not)
    pub fn get_member(&self, id: &str) -> Result<Option<Member>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM members WHERE id = ?", [id], |row| {
            Self::row_to_member(row)
        })
        .optional()
        .map_err(Error::from)
    }

    /// List active members with the given role
    pub fn list_members(&self, role: Role) -> Result<Vec<Member>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM members WHERE role = ?1 AND is_active = 1 ORDER BY lastname, firstname",
        )?;
        let members = stmt
            .query_map([role.as_str()], |row| Self::row_to_member(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    /// List the distinct active students enrolled in any of a teacher's courses
    pub fn students_of_teacher(&self, teacher_id: &str) -> Result<Vec<Member>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT m.* FROM members m
            JOIN enrollments e ON e.student_id = m.id
            JOIN courses c ON c.id = e.course_id
            WHERE c.teacher_id = ?1 AND m.is_active = 1
            ORDER BY m.lastname, m.firstname
            "#,
        )?;
        let members = stmt
            .query_map([teacher_id], |row| Self::row_to_member(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    fn row_to_member(row: &Row) -> rusqlite::Result<Member> {
        let role_str: String = row.get("role")?;
        let gender_str: Option<String> = row.get("gender")?;
        let birth_str: Option<String> = row.get("birth_date")?;
        let created_at_str: String = row.get("created_at")?;

        Ok(Member {
            id: row.get("id")?,
            role: role_str.parse().unwrap_or(Role::Student),
            firstname: row.get("firstname")?,
            lastname: row.get("lastname")?,
            gender: gender_str.and_then(|s| s.parse().ok()),
            birth_date: birth_str.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            is_active: row.get("is_active")?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    // ============================================
    // Course operations
    // ============================================

    /// Insert a course
    pub fn insert_course(&self, course: &Course) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO courses (id, teacher_id, subject, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                course.id,
                course.teacher_id,
                course.subject,
                course.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Enroll a student in a course (idempotent)
    pub fn enroll_student(&self, course_id: &str, student_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO enrollments (course_id, student_id) VALUES (?1, ?2)",
            params![course_id, student_id],
        )?;
        Ok(())
    }

    // ============================================
    // Attendance records
    // ============================================

    /// Insert an attendance record
    pub fn insert_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO attendance_records (id, student_id, course_id, date, present, comment, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id,
                record.student_id,
                record.course_id,
                record.date.format("%Y-%m-%d").to_string(),
                record.present,
                record.comment,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All attendance records for a student, newest first
    pub fn attendance_for_student(&self, student_id: &str) -> Result<Vec<AttendanceRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM attendance_records WHERE student_id = ?1 ORDER BY date DESC",
        )?;
        let records = stmt
            .query_map([student_id], |row| Self::row_to_attendance(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// All attendance records within `[from, to]`, oldest first
    pub fn attendance_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM attendance_records WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
        )?;
        let records = stmt
            .query_map(
                params![
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string()
                ],
                |row| Self::row_to_attendance(row),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn row_to_attendance(row: &Row) -> rusqlite::Result<AttendanceRecord> {
        Ok(AttendanceRecord {
            id: row.get("id")?,
            student_id: row.get("student_id")?,
            course_id: row.get("course_id")?,
            date: parse_date("date", row)?,
            present: row.get("present")?,
            comment: row.get("comment")?,
        })
    }

    // ============================================
    // Behavior records
    // ============================================

    /// Insert a behavior record
    pub fn insert_behavior(&self, record: &BehaviorRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO behavior_records (id, student_id, course_id, date, rating, comment, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id,
                record.student_id,
                record.course_id,
                record.date.format("%Y-%m-%d").to_string(),
                record.rating,
                record.comment,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All behavior records for a student, newest first
    pub fn behavior_for_student(&self, student_id: &str) -> Result<Vec<BehaviorRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM behavior_records WHERE student_id = ?1 ORDER BY date DESC")?;
        let records = stmt
            .query_map([student_id], |row| Self::row_to_behavior(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Self::validate_ratings(&records)?;
        Ok(records)
    }

    /// All behavior records within `[from, to]`, oldest first
    pub fn behavior_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<BehaviorRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM behavior_records WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
        )?;
        let records = stmt
            .query_map(
                params![
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string()
                ],
                |row| Self::row_to_behavior(row),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Self::validate_ratings(&records)?;
        Ok(records)
    }

    /// Ratings outside the 1-5 scale are a data-shape error, not a
    /// value to silently clamp.
    fn validate_ratings(records: &[BehaviorRecord]) -> Result<()> {
        for record in records {
            if !(1..=5).contains(&record.rating) {
                return Err(Error::Computation(format!(
                    "behavior rating out of range: {} (record {})",
                    record.rating, record.id
                )));
            }
        }
        Ok(())
    }

    fn row_to_behavior(row: &Row) -> rusqlite::Result<BehaviorRecord> {
        Ok(BehaviorRecord {
            id: row.get("id")?,
            student_id: row.get("student_id")?,
            course_id: row.get("course_id")?,
            date: parse_date("date", row)?,
            rating: row.get("rating")?,
            comment: row.get("comment")?,
        })
    }

    // ============================================
    // Grade records
    // ============================================

    /// Insert a grade record
    pub fn insert_grade(&self, record: &GradeRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO grade_records (id, student_id, course_id, date, value, subject, is_absent, is_draft, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.id,
                record.student_id,
                record.course_id,
                record.date.format("%Y-%m-%d").to_string(),
                record.value,
                record.subject,
                record.is_absent,
                record.is_draft,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All grade records for a student, newest first
    pub fn grades_for_student(&self, student_id: &str) -> Result<Vec<GradeRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM grade_records WHERE student_id = ?1 ORDER BY date DESC")?;
        let records = stmt
            .query_map([student_id], |row| Self::row_to_grade(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for record in &records {
            if !(0.0..=20.0).contains(&record.value) {
                return Err(Error::Computation(format!(
                    "grade value out of range: {} (record {})",
                    record.value, record.id
                )));
            }
        }
        Ok(records)
    }

    fn row_to_grade(row: &Row) -> rusqlite::Result<GradeRecord> {
        Ok(GradeRecord {
            id: row.get("id")?,
            student_id: row.get("student_id")?,
            course_id: row.get("course_id")?,
            date: parse_date("date", row)?,
            value: row.get("value")?,
            subject: row.get("subject")?,
            is_absent: row.get("is_absent")?,
            is_draft: row.get("is_draft")?,
        })
    }
}
