//! Database layer for scolaris
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for roster and record queries
//!
//! Aggregation code never talks to this module directly; it goes
//! through the [`crate::fetch::RecordFetcher`] boundary instead.

pub mod repo;
pub mod schema;

pub use repo::{new_record_id, Database};
