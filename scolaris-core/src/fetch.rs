//! Record fetch boundary
//!
//! [`RecordFetcher`] is the only surface the statistics engine reads
//! raw data through. It is a pure I/O contract: implementations return
//! records newest-first, report "no records yet" as an empty vector,
//! and surface store failures as [`crate::Error::FetchFailed`].
//!
//! The production implementation is the SQLite [`Database`]; tests use
//! counting fakes to assert fetch-cycle counts.

use crate::db::Database;
use crate::error::Result;
use crate::types::{AttendanceRecord, BehaviorRecord, GradeRecord, Member, Role};
use chrono::NaiveDate;

/// Read access to raw records and the roster.
///
/// Methods are synchronous; the façade runs them on the tokio blocking
/// pool under its fetch timeout.
pub trait RecordFetcher: Send + Sync {
    /// A member by id, or `None` if unknown.
    fn member(&self, id: &str) -> Result<Option<Member>>;

    /// Active members with the given role.
    fn members(&self, role: Role) -> Result<Vec<Member>>;

    /// Distinct active students across a teacher's courses.
    fn students_of_teacher(&self, teacher_id: &str) -> Result<Vec<Member>>;

    /// Attendance records for a student, newest first.
    fn attendance_for_student(&self, student_id: &str) -> Result<Vec<AttendanceRecord>>;

    /// Behavior records for a student, newest first.
    fn behavior_for_student(&self, student_id: &str) -> Result<Vec<BehaviorRecord>>;

    /// Grade records for a student, newest first.
    fn grades_for_student(&self, student_id: &str) -> Result<Vec<GradeRecord>>;

    /// Attendance records within `[from, to]`, oldest first (duplicate audit).
    fn attendance_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AttendanceRecord>>;

    /// Behavior records within `[from, to]`, oldest first (duplicate audit).
    fn behavior_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<BehaviorRecord>>;
}

impl RecordFetcher for Database {
    fn member(&self, id: &str) -> Result<Option<Member>> {
        self.get_member(id)
    }

    fn members(&self, role: Role) -> Result<Vec<Member>> {
        self.list_members(role)
    }

    fn students_of_teacher(&self, teacher_id: &str) -> Result<Vec<Member>> {
        Database::students_of_teacher(self, teacher_id)
    }

    fn attendance_for_student(&self, student_id: &str) -> Result<Vec<AttendanceRecord>> {
        Database::attendance_for_student(self, student_id)
    }

    fn behavior_for_student(&self, student_id: &str) -> Result<Vec<BehaviorRecord>> {
        Database::behavior_for_student(self, student_id)
    }

    fn grades_for_student(&self, student_id: &str) -> Result<Vec<GradeRecord>> {
        Database::grades_for_student(self, student_id)
    }

    fn attendance_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        Database::attendance_between(self, from, to)
    }

    fn behavior_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<BehaviorRecord>> {
        Database::behavior_between(self, from, to)
    }
}
