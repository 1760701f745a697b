//! # scolaris-core
//!
//! Core library for scolaris - statistics aggregation and caching for
//! a school roster.
//!
//! This library provides:
//! - Domain types for members, courses, and raw records
//! - SQLite storage layer and the record-fetch boundary
//! - Pure rate calculators and duplicate detection
//! - A TTL cache with single-flight computation behind a façade
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Raw records are immutable facts; everything above them is derived
//! and regenerable:
//! - **Raw:** attendance, behavior, and grade rows in SQLite
//! - **Derived:** per-student, per-teacher, and global aggregates
//! - **Cached:** derived values held for a short TTL and refreshed
//!   behind stale reads
//!
//! ## Example
//!
//! ```rust,no_run
//! use scolaris_core::{Config, Database, StatsService, StatsSettings};
//! use std::sync::Arc;
//!
//! # async fn run() -> scolaris_core::Result<()> {
//! let config = Config::load()?;
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//!
//! let service = StatsService::new(Arc::new(db), StatsSettings::from(&config.stats));
//! let response = service.global_stats().await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{new_record_id, Database};
pub use error::{Error, Result};
pub use fetch::RecordFetcher;
pub use stats::{RecalcReport, StatsKey, StatsService, StatsSettings};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod stats;
pub mod types;
