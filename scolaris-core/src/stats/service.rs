//! Statistics façade
//!
//! [`StatsService`] is the single entry point consumers call for
//! derived statistics. Every request goes through the cache first; on
//! a miss it elects one leader to fetch and compute while concurrent
//! callers wait on the same flight.
//!
//! Failure handling is best-effort: a store error behind a still-warm
//! cache degrades to the cached value (flagged in the envelope), and
//! only an unknown entity id is reported as a hard failure with no
//! payload substitution from the cache.
//!
//! Computation runs in detached tasks, so a caller that gives up never
//! cancels a cache population already under way; synchronous record
//! fetches run on the blocking pool under the configured timeout.

use crate::config::StatsConfig;
use crate::error::{Error, Result};
use crate::fetch::RecordFetcher;
use crate::stats::cache::{ComputeOutcome, ComputeRole, Lookup, StatsCache};
use crate::stats::{calc, duplicates};
use crate::stats::{
    DuplicateGroup, GlobalStats, StatsKey, StatsValue, StudentStats, TeacherStats,
};
use crate::types::{ApiResponse, AttendanceRecord, BehaviorRecord, Member, Role};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runtime knobs for the statistics engine.
#[derive(Debug, Clone)]
pub struct StatsSettings {
    /// First day of the academic year, seeds duplicate-audit periods
    pub academic_year_start: NaiveDate,
    /// How long a cached aggregate stays fresh
    pub cache_ttl: Duration,
    /// Bound on one record-fetch step
    pub fetch_timeout: Duration,
}

impl From<&StatsConfig> for StatsSettings {
    fn from(config: &StatsConfig) -> Self {
        Self {
            academic_year_start: config.academic_year_start,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }
}

/// One entity that failed during bulk recalculation.
#[derive(Debug, Clone, Serialize)]
pub struct FailedEntity {
    /// Cache key of the failed aggregate
    pub id: String,
    /// Why it failed
    pub error: String,
}

/// Outcome of a bulk recalculation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecalcReport {
    /// Aggregates recomputed and cached
    pub processed: usize,
    /// Aggregates that could not be recomputed
    pub failed: Vec<FailedEntity>,
}

struct Inner {
    fetcher: Arc<dyn RecordFetcher>,
    cache: StatsCache,
    settings: StatsSettings,
}

/// The statistics engine façade. Cheap to clone; all clones share one
/// cache and one fetcher.
#[derive(Clone)]
pub struct StatsService {
    inner: Arc<Inner>,
}

impl StatsService {
    pub fn new(fetcher: Arc<dyn RecordFetcher>, settings: StatsSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: StatsCache::new(settings.cache_ttl),
                fetcher,
                settings,
            }),
        }
    }

    // ============================================
    // Public operations
    // ============================================

    /// Statistics for one student.
    pub async fn student_stats(&self, student_id: &str) -> ApiResponse<StudentStats> {
        let served = self.resolve(StatsKey::Student(student_id.to_string())).await;
        respond(
            served,
            |value| match value {
                StatsValue::Student(stats) => Some(stats),
                _ => None,
            },
            StudentStats::zeroed,
        )
    }

    /// Statistics for one teacher.
    pub async fn teacher_stats(&self, teacher_id: &str) -> ApiResponse<TeacherStats> {
        let served = self.resolve(StatsKey::Teacher(teacher_id.to_string())).await;
        respond(
            served,
            |value| match value {
                StatsValue::Teacher(stats) => Some(stats),
                _ => None,
            },
            TeacherStats::zeroed,
        )
    }

    /// System-wide statistics.
    pub async fn global_stats(&self) -> ApiResponse<GlobalStats> {
        let served = self.resolve(StatsKey::Global).await;
        respond(
            served,
            |value| match value {
                StatsValue::Global(stats) => Some(stats),
                _ => None,
            },
            GlobalStats::zeroed,
        )
    }

    /// Drop the cached aggregate for `key`; the next request recomputes.
    pub fn invalidate(&self, key: &StatsKey) {
        self.inner.cache.invalidate(key);
    }

    /// Recompute and cache every aggregate: each student, each teacher,
    /// and the global roll-up. Failures are collected per entity and
    /// never abort the pass.
    pub async fn recalculate_all(&self) -> RecalcReport {
        let roster = self
            .fetch_blocking(|fetcher| {
                Ok((
                    fetcher.members(Role::Student)?,
                    fetcher.members(Role::Teacher)?,
                ))
            })
            .await;

        let (students, teachers) = match roster {
            Ok(roster) => roster,
            Err(err) => {
                warn!(error = %err, "recalculation aborted: roster unavailable");
                return RecalcReport {
                    processed: 0,
                    failed: vec![FailedEntity {
                        id: "roster".to_string(),
                        error: err.to_string(),
                    }],
                };
            }
        };

        let mut keys: Vec<StatsKey> = students
            .iter()
            .map(|m| StatsKey::Student(m.id.clone()))
            .chain(teachers.iter().map(|m| StatsKey::Teacher(m.id.clone())))
            .collect();
        keys.push(StatsKey::Global);

        let mut report = RecalcReport::default();
        for key in keys {
            match self.compute(&key).await {
                Ok(value) => {
                    self.inner.cache.insert(&key, value);
                    report.processed += 1;
                }
                Err(err) => report.failed.push(FailedEntity {
                    id: key.to_string(),
                    error: err.to_string(),
                }),
            }
        }

        debug!(
            processed = report.processed,
            failed = report.failed.len(),
            "recalculation finished"
        );
        report
    }

    /// Duplicate attendance records from the academic-year start
    /// through today. Always reads the store directly; audits must not
    /// see cached data.
    pub async fn attendance_duplicates(&self) -> Result<Vec<DuplicateGroup<AttendanceRecord>>> {
        let (start, until) = self.audit_window();
        let records = self
            .fetch_blocking(move |fetcher| fetcher.attendance_between(start, until))
            .await?;
        let periods = duplicates::week_periods(start, until);
        Ok(duplicates::attendance_duplicates(&records, &periods))
    }

    /// Duplicate behavior records from the academic-year start through
    /// today.
    pub async fn behavior_duplicates(&self) -> Result<Vec<DuplicateGroup<BehaviorRecord>>> {
        let (start, until) = self.audit_window();
        let records = self
            .fetch_blocking(move |fetcher| fetcher.behavior_between(start, until))
            .await?;
        let periods = duplicates::week_periods(start, until);
        Ok(duplicates::behavior_duplicates(&records, &periods))
    }

    // ============================================
    // Cache protocol
    // ============================================

    async fn resolve(&self, key: StatsKey) -> Served {
        match self.inner.cache.lookup(&key) {
            Lookup::Fresh(value) => Served::Fresh(value),
            Lookup::Stale(value) => {
                // Serve the stale value immediately; refresh behind it.
                self.spawn_refresh(key);
                Served::Stale(value)
            }
            Lookup::Absent => match self.compute_via_flight(key.clone()).await {
                ComputeOutcome::Ready(value) => Served::Fresh(value),
                ComputeOutcome::Failed { message, fallback } => {
                    if fallback {
                        match self.inner.cache.lookup(&key) {
                            Lookup::Fresh(value) | Lookup::Stale(value) => {
                                return Served::Degraded {
                                    value,
                                    error: message,
                                };
                            }
                            Lookup::Absent => {}
                        }
                    }
                    Served::Failed { error: message }
                }
            },
        }
    }

    /// Compute through the single-flight protocol: the first caller
    /// leads, the rest await its broadcast outcome.
    async fn compute_via_flight(&self, key: StatsKey) -> ComputeOutcome {
        match self.inner.cache.begin_compute(&key) {
            ComputeRole::Leader => {
                // Detached task: the cache still gets populated if this
                // caller is cancelled mid-await.
                let service = self.clone();
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let mut guard = FlightGuard::new(service.clone(), task_key.clone());
                    let outcome = service.compute_outcome(&task_key).await;
                    service.inner.cache.finish_compute(&task_key, outcome.clone());
                    guard.disarm();
                    outcome
                });
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(err) => ComputeOutcome::Failed {
                        message: format!("computation task failed: {}", err),
                        fallback: true,
                    },
                }
            }
            ComputeRole::Follower(mut rx) => match rx.recv().await {
                Ok(outcome) => outcome,
                Err(_) => ComputeOutcome::Failed {
                    message: "computation abandoned".to_string(),
                    fallback: true,
                },
            },
        }
    }

    fn spawn_refresh(&self, key: StatsKey) {
        // Follower means a refresh is already running; nothing to do.
        if let ComputeRole::Leader = self.inner.cache.begin_compute(&key) {
            let service = self.clone();
            tokio::spawn(async move {
                let mut guard = FlightGuard::new(service.clone(), key.clone());
                let outcome = service.compute_outcome(&key).await;
                service.inner.cache.finish_compute(&key, outcome);
                guard.disarm();
            });
        }
    }

    async fn compute_outcome(&self, key: &StatsKey) -> ComputeOutcome {
        match self.compute(key).await {
            Ok(value) => ComputeOutcome::Ready(value),
            Err(err) => {
                warn!(%key, error = %err, "statistics computation failed");
                ComputeOutcome::Failed {
                    message: err.to_string(),
                    fallback: err.allows_stale_fallback(),
                }
            }
        }
    }

    // ============================================
    // Computation
    // ============================================

    async fn compute(&self, key: &StatsKey) -> Result<StatsValue> {
        match key {
            StatsKey::Student(id) => self.compute_student(id.clone()).await,
            StatsKey::Teacher(id) => self.compute_teacher(id.clone()).await,
            StatsKey::Global => self.compute_global().await,
        }
    }

    async fn compute_student(&self, id: String) -> Result<StatsValue> {
        let member_id = id.clone();
        let (member, attendance, behavior, grades) = self
            .fetch_blocking(move |fetcher| {
                let member = fetcher.member(&id)?;
                let attendance = fetcher.attendance_for_student(&id)?;
                let behavior = fetcher.behavior_for_student(&id)?;
                let grades = fetcher.grades_for_student(&id)?;
                Ok((member, attendance, behavior, grades))
            })
            .await?;

        let member = member.ok_or(Error::InvalidEntity(member_id))?;
        require_role(&member, Role::Student)?;

        Ok(StatsValue::Student(calc::student_stats(
            &attendance,
            &behavior,
            &grades,
        )))
    }

    async fn compute_teacher(&self, id: String) -> Result<StatsValue> {
        let member_id = id.clone();
        let (member, students) = self
            .fetch_blocking(move |fetcher| {
                let member = fetcher.member(&id)?;
                let students = fetcher.students_of_teacher(&id)?;
                Ok((member, students))
            })
            .await?;

        let member = member.ok_or(Error::InvalidEntity(member_id))?;
        require_role(&member, Role::Teacher)?;

        Ok(StatsValue::Teacher(calc::teacher_stats(
            &students,
            Utc::now().date_naive(),
        )))
    }

    async fn compute_global(&self) -> Result<StatsValue> {
        let (rates, student_count, teacher_count) = self
            .fetch_blocking(|fetcher| {
                let students = fetcher.members(Role::Student)?;
                let teachers = fetcher.members(Role::Teacher)?;
                // Only students with recorded attendance enter the mean,
                // so an unmarked new enrollee cannot dilute it.
                let mut rates = Vec::new();
                for student in &students {
                    let records = fetcher.attendance_for_student(&student.id)?;
                    if !records.is_empty() {
                        rates.push(calc::attendance_summary(&records).rate);
                    }
                }
                Ok((rates, students.len(), teachers.len()))
            })
            .await?;

        Ok(StatsValue::Global(calc::global_stats(
            &rates,
            student_count,
            teacher_count,
        )))
    }

    // ============================================
    // I/O plumbing
    // ============================================

    /// Run a synchronous fetch on the blocking pool under the
    /// configured timeout.
    async fn fetch_blocking<T, F>(&self, fetch: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordFetcher) -> Result<T> + Send + 'static,
    {
        let fetcher = Arc::clone(&self.inner.fetcher);
        let timeout = self.inner.settings.fetch_timeout;
        let handle = tokio::task::spawn_blocking(move || fetch(fetcher.as_ref()));

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::Computation(format!(
                "fetch task failed: {}",
                join_err
            ))),
            Err(_) => Err(Error::FetchTimeout(timeout.as_secs())),
        }
    }

    /// Date range audits cover: academic-year start through today.
    fn audit_window(&self) -> (NaiveDate, NaiveDate) {
        let start = self.inner.settings.academic_year_start;
        (start, Utc::now().date_naive().max(start))
    }
}

/// Clears the in-flight entry for a key if the owning task unwinds
/// before `finish_compute` runs, so followers can never be stranded on
/// a flight with no leader.
struct FlightGuard {
    flight: Option<(StatsService, StatsKey)>,
}

impl FlightGuard {
    fn new(service: StatsService, key: StatsKey) -> Self {
        Self {
            flight: Some((service, key)),
        }
    }

    fn disarm(&mut self) {
        self.flight = None;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some((service, key)) = self.flight.take() {
            service.inner.cache.abort_compute(&key);
        }
    }
}

enum Served {
    Fresh(StatsValue),
    Stale(StatsValue),
    Degraded { value: StatsValue, error: String },
    Failed { error: String },
}

/// Map a cache disposition onto the response envelope. A failure with
/// no cached value of any freshness carries a zero-valued payload, so
/// consumers can always render a neutral "no data" state.
fn respond<T>(
    served: Served,
    extract: impl Fn(StatsValue) -> Option<T>,
    zeroed: impl Fn() -> T,
) -> ApiResponse<T> {
    let mismatched = "internal error: mismatched aggregate kind";
    match served {
        Served::Fresh(value) => match extract(value) {
            Some(data) => ApiResponse::ok(data, "statistics ready"),
            None => ApiResponse::fail(Some(zeroed()), mismatched),
        },
        Served::Stale(value) => match extract(value) {
            Some(data) => ApiResponse::ok(data, "serving cached statistics"),
            None => ApiResponse::fail(Some(zeroed()), mismatched),
        },
        Served::Degraded { value, error } => match extract(value) {
            Some(data) => ApiResponse::degraded(data, error),
            None => ApiResponse::fail(Some(zeroed()), mismatched),
        },
        Served::Failed { error } => ApiResponse::fail(Some(zeroed()), error),
    }
}

fn require_role(member: &Member, expected: Role) -> Result<()> {
    if member.role == expected {
        Ok(())
    } else {
        Err(Error::InvalidEntity(format!(
            "{} is a {}, not a {}",
            member.id,
            member.role.as_str(),
            expected.as_str()
        )))
    }
}
