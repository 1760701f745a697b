//! Statistics engine for scolaris
//!
//! Computes derived statistics from raw attendance/behavior/grade
//! records and serves them through a short-lived shared cache:
//! - Pure rate calculators ([`calc`])
//! - Week-period duplicate detection ([`duplicates`])
//! - TTL + single-flight cache ([`cache`])
//! - The façade consumers call ([`service`])
//!
//! Data flow: façade → cache (read) → [miss] → fetcher → calculators →
//! cache (write) → caller. Raw records are never mutated here.

pub mod cache;
pub mod calc;
pub mod duplicates;
pub mod service;

pub use cache::{CacheEntry, Lookup, StatsCache};
pub use duplicates::{DuplicateGroup, GroupKey, WeekPeriod};
pub use service::{FailedEntity, RecalcReport, StatsService, StatsSettings};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================
// Cache keys
// ============================================

/// Key identifying one cached aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatsKey {
    /// Per-student statistics
    Student(String),
    /// Per-teacher statistics
    Teacher(String),
    /// System-wide statistics (singleton key)
    Global,
}

impl std::fmt::Display for StatsKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsKey::Student(id) => write!(f, "student:{}", id),
            StatsKey::Teacher(id) => write!(f, "teacher:{}", id),
            StatsKey::Global => write!(f, "global"),
        }
    }
}

// ============================================
// Derived statistics
// ============================================

/// One absence, materialized for display lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absence {
    /// Date of the missed session
    pub date: NaiveDate,
    /// Course the session belonged to
    pub course_id: String,
}

/// Mean grade for a single subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAverage {
    /// Number of grades counted
    pub count: usize,
    /// Mean value, two decimals
    pub average: f64,
}

/// Per-subject grade averages plus the overall mean.
///
/// Subjects are computed independently: a subject with no grades is
/// simply absent from the map and never drags the others down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeSummary {
    /// Averages keyed by subject name
    pub by_subject: BTreeMap<String, SubjectAverage>,
    /// Mean across every counted grade, two decimals; `None` without grades
    pub overall_average: Option<f64>,
}

/// Derived statistics for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentStats {
    /// Presence rate over all attendance records, 0-100, one decimal
    pub attendance_rate: f64,
    /// Number of recorded absences
    pub absence_count: usize,
    /// The individual absences, newest first
    pub absences: Vec<Absence>,
    /// Mean behavior rating, 0-5, two decimals
    pub behavior_average: f64,
    /// Grade summary
    pub grades: GradeSummary,
    /// Date of the most recent attendance or behavior record
    pub last_activity: Option<NaiveDate>,
    /// When these statistics were computed
    pub last_update: DateTime<Utc>,
}

impl StudentStats {
    /// Zero-valued stats, used as the best-effort payload on failure.
    pub fn zeroed() -> Self {
        Self {
            attendance_rate: 0.0,
            absence_count: 0,
            absences: Vec::new(),
            behavior_average: 0.0,
            grades: GradeSummary::default(),
            last_activity: None,
            last_update: Utc::now(),
        }
    }
}

/// Gender counts across a teacher's students.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenderCounts {
    pub male: usize,
    pub female: usize,
    pub unspecified: usize,
}

/// Gender shares, formatted with one decimal (e.g. `"45.5"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderPercentages {
    pub male: String,
    pub female: String,
    pub unspecified: String,
}

impl Default for GenderPercentages {
    fn default() -> Self {
        Self {
            male: "0.0".to_string(),
            female: "0.0".to_string(),
            unspecified: "0.0".to_string(),
        }
    }
}

/// Gender distribution of a teacher's students.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenderDistribution {
    pub counts: GenderCounts,
    pub percentages: GenderPercentages,
}

/// Age range and mean across students with a known birth date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeSummary {
    /// Youngest age in years; 0 when no birth dates are known
    pub min: u32,
    /// Oldest age in years; 0 when no birth dates are known
    pub max: u32,
    /// Mean age, one decimal
    pub average: f64,
}

/// Derived statistics for one teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherStats {
    /// Distinct active students across the teacher's courses
    pub student_count: usize,
    /// Gender distribution of those students
    pub gender: GenderDistribution,
    /// Age range and mean of those students
    pub ages: AgeSummary,
    /// When these statistics were computed
    pub last_update: DateTime<Utc>,
}

impl TeacherStats {
    /// Zero-valued stats, used as the best-effort payload on failure.
    pub fn zeroed() -> Self {
        Self {
            student_count: 0,
            gender: GenderDistribution::default(),
            ages: AgeSummary::default(),
            last_update: Utc::now(),
        }
    }
}

/// System-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Mean attendance rate across students with any attendance, one decimal
    pub presence_rate: f64,
    /// Active students in the roster
    pub student_count: usize,
    /// Active teachers in the roster
    pub teacher_count: usize,
    /// When these statistics were computed
    pub last_update: DateTime<Utc>,
}

impl GlobalStats {
    /// Zero-valued stats, used as the best-effort payload on failure.
    pub fn zeroed() -> Self {
        Self {
            presence_rate: 0.0,
            student_count: 0,
            teacher_count: 0,
            last_update: Utc::now(),
        }
    }
}

/// A computed aggregate, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsValue {
    Student(StudentStats),
    Teacher(TeacherStats),
    Global(GlobalStats),
}

impl StatsValue {
    /// Zero-valued stats matching the shape the key would produce.
    pub fn zeroed_for(key: &StatsKey) -> Self {
        match key {
            StatsKey::Student(_) => StatsValue::Student(StudentStats::zeroed()),
            StatsKey::Teacher(_) => StatsValue::Teacher(TeacherStats::zeroed()),
            StatsKey::Global => StatsValue::Global(GlobalStats::zeroed()),
        }
    }
}
