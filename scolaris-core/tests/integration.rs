//! Integration tests for the scolaris statistics engine
//!
//! These tests run the full stack: a seeded in-memory SQLite database
//! behind the record-fetch boundary, the cache, and the façade. A
//! counting wrapper around the database asserts how many fetch cycles
//! actually reached the store.

use chrono::{NaiveDate, Utc};
use scolaris_core::db::{new_record_id, Database};
use scolaris_core::fetch::RecordFetcher;
use scolaris_core::stats::{StatsKey, StatsService, StatsSettings};
use scolaris_core::types::{
    AttendanceRecord, BehaviorRecord, Course, Gender, GradeRecord, Member, Role,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================
// Test instrumentation
// ============================================

/// Database wrapper that counts member lookups and can inject delay
/// or failure into every fetch.
struct CountingFetcher {
    db: Database,
    member_calls: AtomicUsize,
    delay_ms: AtomicU64,
    fail: AtomicBool,
}

impl CountingFetcher {
    fn new(db: Database) -> Self {
        Self {
            db,
            member_calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
            fail: AtomicBool::new(false),
        }
    }

    fn gate(&self) -> scolaris_core::Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            // Fetches run on the blocking pool, so a real sleep is fine.
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(scolaris_core::Error::Computation(
                "store offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl RecordFetcher for CountingFetcher {
    fn member(&self, id: &str) -> scolaris_core::Result<Option<Member>> {
        self.member_calls.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        self.db.member(id)
    }

    fn members(&self, role: Role) -> scolaris_core::Result<Vec<Member>> {
        self.gate()?;
        self.db.members(role)
    }

    fn students_of_teacher(&self, teacher_id: &str) -> scolaris_core::Result<Vec<Member>> {
        self.gate()?;
        self.db.students_of_teacher(teacher_id)
    }

    fn attendance_for_student(
        &self,
        student_id: &str,
    ) -> scolaris_core::Result<Vec<AttendanceRecord>> {
        self.gate()?;
        self.db.attendance_for_student(student_id)
    }

    fn behavior_for_student(
        &self,
        student_id: &str,
    ) -> scolaris_core::Result<Vec<BehaviorRecord>> {
        self.gate()?;
        self.db.behavior_for_student(student_id)
    }

    fn grades_for_student(&self, student_id: &str) -> scolaris_core::Result<Vec<GradeRecord>> {
        self.gate()?;
        self.db.grades_for_student(student_id)
    }

    fn attendance_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> scolaris_core::Result<Vec<AttendanceRecord>> {
        self.gate()?;
        self.db.attendance_between(from, to)
    }

    fn behavior_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> scolaris_core::Result<Vec<BehaviorRecord>> {
        self.gate()?;
        self.db.behavior_between(from, to)
    }
}

// ============================================
// Seeding helpers
// ============================================

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn member(id: &str, role: Role, gender: Gender, birth: NaiveDate) -> Member {
    Member {
        id: id.to_string(),
        role,
        firstname: "Amira".to_string(),
        lastname: "Haddad".to_string(),
        gender: Some(gender),
        birth_date: Some(birth),
        is_active: true,
        created_at: Utc::now(),
    }
}

fn seeded_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();

    db.upsert_member(&member("t1", Role::Teacher, Gender::Female, date(1985, 5, 1)))
        .unwrap();
    db.upsert_member(&member("s1", Role::Student, Gender::Female, date(2014, 3, 1)))
        .unwrap();
    db.upsert_member(&member("s2", Role::Student, Gender::Male, date(2013, 7, 15)))
        .unwrap();

    db.insert_course(&Course {
        id: "c1".to_string(),
        teacher_id: "t1".to_string(),
        subject: "Arabic".to_string(),
        created_at: Utc::now(),
    })
    .unwrap();
    db.enroll_student("c1", "s1").unwrap();
    db.enroll_student("c1", "s2").unwrap();

    // s1: present 8 of 10 sessions
    for i in 0..10 {
        db.insert_attendance(&AttendanceRecord {
            id: new_record_id(),
            student_id: "s1".to_string(),
            course_id: "c1".to_string(),
            date: date(2024, 9, 2) + chrono::Duration::days(i * 7),
            present: i < 8,
            comment: None,
        })
        .unwrap();
    }

    db.insert_behavior(&BehaviorRecord {
        id: new_record_id(),
        student_id: "s1".to_string(),
        course_id: "c1".to_string(),
        date: date(2024, 9, 2),
        rating: 4,
        comment: None,
    })
    .unwrap();
    db.insert_behavior(&BehaviorRecord {
        id: new_record_id(),
        student_id: "s1".to_string(),
        course_id: "c1".to_string(),
        date: date(2024, 9, 9),
        rating: 3,
        comment: None,
    })
    .unwrap();

    db.insert_grade(&GradeRecord {
        id: new_record_id(),
        student_id: "s1".to_string(),
        course_id: "c1".to_string(),
        date: date(2024, 10, 1),
        value: 14.0,
        subject: "Arabic".to_string(),
        is_absent: false,
        is_draft: false,
    })
    .unwrap();
    db.insert_grade(&GradeRecord {
        id: new_record_id(),
        student_id: "s1".to_string(),
        course_id: "c1".to_string(),
        date: date(2024, 10, 8),
        value: 19.0,
        subject: "Arabic".to_string(),
        is_absent: false,
        is_draft: true,
    })
    .unwrap();

    db
}

fn settings() -> StatsSettings {
    StatsSettings {
        academic_year_start: date(2024, 9, 1),
        cache_ttl: Duration::from_secs(60),
        fetch_timeout: Duration::from_secs(5),
    }
}

fn service() -> (StatsService, Arc<CountingFetcher>) {
    let fetcher = Arc::new(CountingFetcher::new(seeded_db()));
    (
        StatsService::new(Arc::clone(&fetcher) as Arc<dyn RecordFetcher>, settings()),
        fetcher,
    )
}

// ============================================
// End-to-end aggregation
// ============================================

#[tokio::test]
async fn test_student_stats_end_to_end() {
    let (service, _) = service();

    let response = service.student_stats("s1").await;
    assert!(response.success);

    let stats = response.data.unwrap();
    assert_eq!(stats.attendance_rate, 80.0);
    assert_eq!(stats.absence_count, 2);
    assert_eq!(stats.behavior_average, 3.5);
    // The draft grade is excluded
    assert_eq!(stats.grades.overall_average, Some(14.0));
    assert_eq!(stats.grades.by_subject["Arabic"].count, 1);
}

#[tokio::test]
async fn test_teacher_stats_end_to_end() {
    let (service, _) = service();

    let response = service.teacher_stats("t1").await;
    assert!(response.success);

    let stats = response.data.unwrap();
    assert_eq!(stats.student_count, 2);
    assert_eq!(stats.gender.counts.female, 1);
    assert_eq!(stats.gender.counts.male, 1);
    assert_eq!(stats.gender.percentages.female, "50.0");
}

#[tokio::test]
async fn test_global_stats_end_to_end() {
    let (service, _) = service();

    let response = service.global_stats().await;
    assert!(response.success);

    let stats = response.data.unwrap();
    assert_eq!(stats.student_count, 2);
    assert_eq!(stats.teacher_count, 1);
    // Only s1 has attendance records, so the mean is s1's rate
    assert_eq!(stats.presence_rate, 80.0);
}

#[tokio::test]
async fn test_unknown_entity_is_hard_failure() {
    let (service, _) = service();

    let response = service.student_stats("ghost").await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("unknown entity"));
    // Zero-valued payload accompanies the failure
    let stats = response.data.unwrap();
    assert_eq!(stats.attendance_rate, 0.0);
    assert_eq!(stats.absence_count, 0);
}

// ============================================
// Cache behavior
// ============================================

#[tokio::test]
async fn test_repeat_requests_hit_cache() {
    let (service, fetcher) = service();

    service.student_stats("s1").await;
    assert_eq!(fetcher.member_calls.load(Ordering::SeqCst), 1);

    for _ in 0..5 {
        let response = service.student_stats("s1").await;
        assert!(response.success);
    }
    assert_eq!(fetcher.member_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidate_forces_exactly_one_refetch() {
    let (service, fetcher) = service();

    service.student_stats("s1").await;
    service.invalidate(&StatsKey::Student("s1".to_string()));

    service.student_stats("s1").await;
    service.student_stats("s1").await;
    assert_eq!(fetcher.member_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch_cycle() {
    let (service, fetcher) = service();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(
            async move { service.student_stats("s1").await },
        ));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap().attendance_rate, 80.0);
    }

    assert_eq!(fetcher.member_calls.load(Ordering::SeqCst), 1);
}

// ============================================
// Failure handling
// ============================================

#[tokio::test]
async fn test_fetch_timeout_is_reported() {
    let fetcher = Arc::new(CountingFetcher::new(seeded_db()));
    let service = StatsService::new(
        Arc::clone(&fetcher) as Arc<dyn RecordFetcher>,
        StatsSettings {
            fetch_timeout: Duration::from_millis(50),
            ..settings()
        },
    );

    fetcher.delay_ms.store(500, Ordering::SeqCst);
    let response = service.student_stats("s1").await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_store_failure_masked_by_warm_cache() {
    let (service, fetcher) = service();

    let warm = service.student_stats("s1").await;
    assert!(warm.success);

    // The cached value keeps being served while the store is down.
    fetcher.fail.store(true, Ordering::SeqCst);
    let response = service.student_stats("s1").await;
    assert!(response.success);
    assert_eq!(response.data.unwrap().attendance_rate, 80.0);
}

// ============================================
// Bulk recalculation and audits
// ============================================

#[tokio::test]
async fn test_recalculate_all_covers_roster_and_global() {
    let (service, fetcher) = service();

    let report = service.recalculate_all().await;
    // s1, s2, t1, global
    assert_eq!(report.processed, 4);
    assert!(report.failed.is_empty());

    // Everything is now cached; requests cause no new member lookups
    let calls = fetcher.member_calls.load(Ordering::SeqCst);
    assert!(service.student_stats("s1").await.success);
    assert!(service.teacher_stats("t1").await.success);
    assert!(service.global_stats().await.success);
    assert_eq!(fetcher.member_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_duplicate_audit_over_database() {
    let db = seeded_db();
    let day = date(2024, 11, 4);
    for _ in 0..2 {
        db.insert_attendance(&AttendanceRecord {
            id: new_record_id(),
            student_id: "s2".to_string(),
            course_id: "c1".to_string(),
            date: day,
            present: true,
            comment: None,
        })
        .unwrap();
    }

    let service = StatsService::new(Arc::new(CountingFetcher::new(db)), settings());
    let groups = service.attendance_duplicates().await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].key.student_id, "s2");
    assert_eq!(groups[0].key.date, Some(day));
    assert_eq!(groups[0].count, 2);
}
