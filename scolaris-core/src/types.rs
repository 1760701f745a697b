//! Core domain types for scolaris
//!
//! These types represent the raw record model read from the education
//! store, plus the response envelope shared by every exposed operation.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Member** | A person in the roster: a Student or a Teacher |
//! | **Course** | A class taught by a Teacher, attended by enrolled Students |
//! | **AttendanceRecord** | One presence/absence mark for a student on a date |
//! | **BehaviorRecord** | One 1-5 behavior rating for a student on a date |
//! | **GradeRecord** | One 0-20 grade for a student in a subject on a date |
//!
//! Raw records are written by teacher-facing forms elsewhere in the
//! system. This engine only ever reads them: an edit is a new record
//! superseding the old one, never an in-place mutation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Roster
// ============================================

/// Role of a roster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Declared gender of a roster member, used for teacher-level
/// distribution statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            _ => Err(format!("unknown gender: {}", s)),
        }
    }
}

/// A student or teacher in the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Unique identifier
    pub id: String,
    /// Student or teacher
    pub role: Role,
    /// First name
    pub firstname: String,
    /// Last name
    pub lastname: String,
    /// Declared gender (optional)
    pub gender: Option<Gender>,
    /// Birth date, used for age statistics (optional)
    pub birth_date: Option<NaiveDate>,
    /// Inactive members are excluded from aggregation
    pub is_active: bool,
    /// When this member was created
    pub created_at: DateTime<Utc>,
}

/// A course taught by a teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier
    pub id: String,
    /// Teacher responsible for the course
    pub teacher_id: String,
    /// Subject taught (e.g. "Arabic")
    pub subject: String,
    /// When this course was created
    pub created_at: DateTime<Utc>,
}

// ============================================
// Raw records
// ============================================

/// One attendance mark for a student.
///
/// Immutable once created; edits produce a superseding record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Unique identifier
    pub id: String,
    /// Student this record belongs to
    pub student_id: String,
    /// Course the session belongs to
    pub course_id: String,
    /// Calendar date of the session
    pub date: NaiveDate,
    /// Whether the student was present
    pub present: bool,
    /// Free-form teacher comment
    pub comment: Option<String>,
}

/// One behavior rating for a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorRecord {
    /// Unique identifier
    pub id: String,
    /// Student this record belongs to
    pub student_id: String,
    /// Course the session belongs to
    pub course_id: String,
    /// Calendar date of the session
    pub date: NaiveDate,
    /// Rating on a 1-5 scale
    pub rating: i64,
    /// Free-form teacher comment
    pub comment: Option<String>,
}

/// One grade for a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRecord {
    /// Unique identifier
    pub id: String,
    /// Student this record belongs to
    pub student_id: String,
    /// Course the grade was given in
    pub course_id: String,
    /// Calendar date of the evaluation
    pub date: NaiveDate,
    /// Grade on a 0-20 scale
    pub value: f64,
    /// Subject the grade belongs to
    pub subject: String,
    /// Student was absent for the evaluation; excluded from averages
    pub is_absent: bool,
    /// Grade not yet published; excluded from averages
    pub is_draft: bool,
}

// ============================================
// Response envelope
// ============================================

/// Uniform response envelope for every exposed operation.
///
/// Callers must treat `success: false` as authoritative regardless of
/// any transport-level status convention. Shape normalization happens
/// once here, not at each consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation succeeded
    pub success: bool,
    /// Payload, if any
    pub data: Option<T>,
    /// Human-readable status message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error description when `success` is false or the result is degraded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response with payload.
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
        }
    }

    /// Successful response served from a cached value after a failed
    /// recomputation. The cause is surfaced in `error` for observability.
    pub fn degraded(data: T, error: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some("serving cached statistics".to_string()),
            error: Some(error.into()),
        }
    }

    /// Failed response, optionally with a best-effort zero-valued payload.
    pub fn fail(data: Option<T>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(Role::Student.as_str(), "student");
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_envelope_serialization() {
        let ok: ApiResponse<i64> = ApiResponse::ok(42, "done");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());

        let fail: ApiResponse<i64> = ApiResponse::fail(None, "boom");
        let json = serde_json::to_value(&fail).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["data"], serde_json::Value::Null);
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_degraded_keeps_success() {
        let resp = ApiResponse::degraded(1, "store unreachable");
        assert!(resp.success);
        assert_eq!(resp.data, Some(1));
        assert!(resp.error.as_deref().unwrap().contains("unreachable"));
    }
}
