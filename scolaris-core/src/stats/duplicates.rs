//! Duplicate record detection
//!
//! Duplicates almost always come from a double-submitted form: the same
//! teacher records the same session twice within the same week, often
//! across a midnight boundary. Records are therefore bucketed into
//! calendar-week periods derived from the academic-year start date and
//! grouped per student and course; attendance additionally groups by
//! the exact date. Any group with more than one record is reported.
//!
//! The bucket for a date is found directly as
//! `floor((date - start) / 7 days)`; dates before the year start or
//! after the last generated period get the sentinel "Other" label.

use crate::types::{AttendanceRecord, BehaviorRecord};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Label for records falling outside every generated week period.
pub const OTHER_PERIOD: &str = "Other";

/// A labeled half-open week interval `[start, end)`.
///
/// Only used for duplicate bucketing; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekPeriod {
    /// Display label, `"Week 1 (01/09 - 07/09)"` style; the rendered
    /// range is inclusive of both days
    pub label: String,
    /// First day of the period (inclusive)
    pub start: NaiveDate,
    /// First day after the period (exclusive)
    pub end: NaiveDate,
}

/// Generate weekly periods from the academic-year start through `until`.
///
/// The last period always contains `until`, so a record dated today is
/// never mislabeled "Other". Returns an empty vector when `until`
/// precedes `start`.
pub fn week_periods(start: NaiveDate, until: NaiveDate) -> Vec<WeekPeriod> {
    let days = (until - start).num_days();
    if days < 0 {
        return Vec::new();
    }

    let weeks = days / 7 + 1;
    (0..weeks)
        .map(|i| {
            let first = start + Duration::days(i * 7);
            let last = first + Duration::days(6);
            WeekPeriod {
                label: format!(
                    "Week {} ({} - {})",
                    i + 1,
                    first.format("%d/%m"),
                    last.format("%d/%m")
                ),
                start: first,
                end: first + Duration::days(7),
            }
        })
        .collect()
}

/// Label of the period containing `date`, or [`OTHER_PERIOD`].
///
/// Computed by index arithmetic rather than scanning period bounds.
pub fn period_label(periods: &[WeekPeriod], date: NaiveDate) -> &str {
    let Some(first) = periods.first() else {
        return OTHER_PERIOD;
    };

    let days = (date - first.start).num_days();
    if days < 0 {
        return OTHER_PERIOD;
    }

    periods
        .get((days / 7) as usize)
        .map(|p| p.label.as_str())
        .unwrap_or(OTHER_PERIOD)
}

/// Key shared by every record in a duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupKey {
    /// Student the duplicated records belong to
    pub student_id: String,
    /// Course the duplicated records belong to
    pub course_id: String,
    /// Exact date, for record kinds grouped per day (attendance)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Week-period label
    pub week: String,
}

/// A set of records sharing a group key, size always >= 2.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup<T> {
    /// The shared key
    pub key: GroupKey,
    /// Number of records in the group
    pub count: usize,
    /// The records, sorted by date ascending
    pub records: Vec<T>,
}

/// Shared grouping core. Groups are keyed per student and course (plus
/// the exact date when `by_exact_date` is set), filtered to size > 1,
/// and ordered by their earliest record date; the `BTreeMap` makes the
/// whole pass deterministic, so detection is idempotent.
fn group_duplicates<T, C, D, S>(
    records: &[T],
    periods: &[WeekPeriod],
    by_exact_date: bool,
    student: S,
    course: C,
    date: D,
) -> Vec<DuplicateGroup<T>>
where
    T: Clone,
    S: Fn(&T) -> &str,
    C: Fn(&T) -> &str,
    D: Fn(&T) -> NaiveDate,
{
    let mut groups: BTreeMap<(String, String, Option<NaiveDate>, String), Vec<T>> =
        BTreeMap::new();

    for record in records {
        let week = period_label(periods, date(record)).to_string();
        let key = (
            student(record).to_string(),
            course(record).to_string(),
            by_exact_date.then(|| date(record)),
            week,
        );
        groups.entry(key).or_default().push(record.clone());
    }

    let mut out: Vec<DuplicateGroup<T>> = groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|((student_id, course_id, day, week), mut members)| {
            members.sort_by_key(&date);
            DuplicateGroup {
                key: GroupKey {
                    student_id,
                    course_id,
                    date: day,
                    week,
                },
                count: members.len(),
                records: members,
            }
        })
        .collect();

    out.sort_by_key(|group| group.records.first().map(&date));
    out
}

/// Duplicate attendance records: same student, course, and calendar date.
pub fn attendance_duplicates(
    records: &[AttendanceRecord],
    periods: &[WeekPeriod],
) -> Vec<DuplicateGroup<AttendanceRecord>> {
    group_duplicates(
        records,
        periods,
        true,
        |r| r.student_id.as_str(),
        |r| r.course_id.as_str(),
        |r| r.date,
    )
}

/// Duplicate behavior records: same student and course within one week.
pub fn behavior_duplicates(
    records: &[BehaviorRecord],
    periods: &[WeekPeriod],
) -> Vec<DuplicateGroup<BehaviorRecord>> {
    group_duplicates(
        records,
        periods,
        false,
        |r| r.student_id.as_str(),
        |r| r.course_id.as_str(),
        |r| r.date,
    )
}
