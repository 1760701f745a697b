//! Pure rate calculators
//!
//! Every function here maps a record set to scalars with no I/O and no
//! hidden state: same input, same output. Division by an empty record
//! set yields 0, never NaN or a panic.

use crate::stats::{
    Absence, AgeSummary, GenderCounts, GenderDistribution, GenderPercentages, GlobalStats,
    GradeSummary, StudentStats, SubjectAverage, TeacherStats,
};
use crate::types::{AttendanceRecord, BehaviorRecord, Gender, GradeRecord, Member};
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};

/// Round to one decimal place.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Attendance aggregate for one student.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSummary {
    /// Total number of attendance records
    pub total: usize,
    /// Number of records marked present
    pub present: usize,
    /// Presence rate 0-100, one decimal; 0 when there are no records
    pub rate: f64,
    /// The absences, in input (newest-first) order
    pub absences: Vec<Absence>,
    /// Date of the most recent record
    pub last_activity: Option<NaiveDate>,
}

/// Compute the attendance rate and absence list.
///
/// Order-insensitive: last activity is the maximum date, not the
/// first record's.
pub fn attendance_summary(records: &[AttendanceRecord]) -> AttendanceSummary {
    let total = records.len();
    let present = records.iter().filter(|r| r.present).count();
    let absences: Vec<Absence> = records
        .iter()
        .filter(|r| !r.present)
        .map(|r| Absence {
            date: r.date,
            course_id: r.course_id.clone(),
        })
        .collect();

    let rate = if total > 0 {
        round1(present as f64 / total as f64 * 100.0)
    } else {
        0.0
    };

    AttendanceSummary {
        total,
        present,
        rate,
        absences,
        last_activity: records.iter().map(|r| r.date).max(),
    }
}

/// Mean behavior rating, two decimals; 0 when there are no records.
///
/// Only the first record per calendar day counts: a double-submitted
/// behavior sheet must not skew the mean.
pub fn behavior_average(records: &[BehaviorRecord]) -> f64 {
    let mut seen_dates = HashSet::new();
    let mut sum = 0i64;
    let mut count = 0usize;

    for record in records {
        if seen_dates.insert(record.date) {
            sum += record.rating;
            count += 1;
        }
    }

    if count > 0 {
        round2(sum as f64 / count as f64)
    } else {
        0.0
    }
}

/// Per-subject and overall grade averages, two decimals each.
///
/// Grades flagged absent or draft are excluded. Each subject is
/// averaged independently; the overall mean runs across every counted
/// grade.
pub fn grade_summary(records: &[GradeRecord]) -> GradeSummary {
    let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for record in records {
        if record.is_absent || record.is_draft {
            continue;
        }
        by_subject
            .entry(record.subject.clone())
            .or_default()
            .push(record.value);
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    let subjects = by_subject
        .into_iter()
        .map(|(subject, values)| {
            sum += values.iter().sum::<f64>();
            count += values.len();
            let average = round2(values.iter().sum::<f64>() / values.len() as f64);
            (
                subject,
                SubjectAverage {
                    count: values.len(),
                    average,
                },
            )
        })
        .collect();

    GradeSummary {
        by_subject: subjects,
        overall_average: if count > 0 {
            Some(round2(sum / count as f64))
        } else {
            None
        },
    }
}

/// Assemble the full per-student aggregate from its record sets.
pub fn student_stats(
    attendance: &[AttendanceRecord],
    behavior: &[BehaviorRecord],
    grades: &[GradeRecord],
) -> StudentStats {
    let summary = attendance_summary(attendance);
    let behavior_last = behavior.iter().map(|r| r.date).max();

    StudentStats {
        attendance_rate: summary.rate,
        absence_count: summary.absences.len(),
        absences: summary.absences,
        behavior_average: behavior_average(behavior),
        grades: grade_summary(grades),
        last_activity: summary.last_activity.max(behavior_last),
        last_update: Utc::now(),
    }
}

/// Teacher aggregate over the teacher's distinct students.
///
/// Ages are computed against `today` from the birth dates we know;
/// students without one only appear in the gender "unspecified" bucket
/// if they also lack a declared gender.
pub fn teacher_stats(students: &[Member], today: NaiveDate) -> TeacherStats {
    let mut counts = GenderCounts::default();
    for student in students {
        match student.gender {
            Some(Gender::Male) => counts.male += 1,
            Some(Gender::Female) => counts.female += 1,
            None => counts.unspecified += 1,
        }
    }

    let total = students.len();
    let pct = |n: usize| -> String {
        if total > 0 {
            format!("{:.1}", n as f64 / total as f64 * 100.0)
        } else {
            "0.0".to_string()
        }
    };
    let percentages = GenderPercentages {
        male: pct(counts.male),
        female: pct(counts.female),
        unspecified: pct(counts.unspecified),
    };

    let ages: Vec<u32> = students
        .iter()
        .filter_map(|s| s.birth_date)
        .filter_map(|birth| today.years_since(birth))
        .collect();

    let age_summary = if ages.is_empty() {
        AgeSummary::default()
    } else {
        AgeSummary {
            min: *ages.iter().min().unwrap_or(&0),
            max: *ages.iter().max().unwrap_or(&0),
            average: round1(ages.iter().sum::<u32>() as f64 / ages.len() as f64),
        }
    };

    TeacherStats {
        student_count: total,
        gender: GenderDistribution {
            counts,
            percentages,
        },
        ages: age_summary,
        last_update: Utc::now(),
    }
}

/// System-wide aggregate.
///
/// The presence rate is the mean of per-student attendance rates,
/// counting only students with at least one attendance record.
pub fn global_stats(
    student_rates: &[f64],
    student_count: usize,
    teacher_count: usize,
) -> GlobalStats {
    let presence_rate = if student_rates.is_empty() {
        0.0
    } else {
        round1(student_rates.iter().sum::<f64>() / student_rates.len() as f64)
    };

    GlobalStats {
        presence_rate,
        student_count,
        teacher_count,
        last_update: Utc::now(),
    }
}
