//! scolaris - education statistics CLI
//!
//! Thin command-line front end over the scolaris-core statistics
//! engine. Every command prints the engine's JSON envelope (or report)
//! to stdout; logs go to the state directory, never the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scolaris_core::{ApiResponse, Config, Database, StatsService, StatsSettings};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "scolaris", version, about = "Statistics for a school roster")]
struct Cli {
    /// Path to the SQLite database (defaults to the XDG data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the configuration file (defaults to the XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Statistics for one student
    Student {
        /// Member id of the student
        id: String,
    },
    /// Statistics for one teacher
    Teacher {
        /// Member id of the teacher
        id: String,
    },
    /// System-wide statistics
    Global,
    /// Recompute and cache every aggregate, reporting per-entity failures
    Recalculate,
    /// Audit raw records for duplicates
    Duplicates {
        /// Which record kind to audit
        #[arg(value_enum)]
        kind: DuplicateKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DuplicateKind {
    Attendance,
    Behavior,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    // Initialize logging (to file, stdout is reserved for JSON output)
    let _log_guard =
        scolaris_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("scolaris starting up");

    // Open database
    let db_path = cli.db.clone().unwrap_or_else(Config::database_path);
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let service = StatsService::new(Arc::new(db), StatsSettings::from(&config.stats));

    match cli.command {
        Command::Student { id } => print_json(&service.student_stats(&id).await)?,
        Command::Teacher { id } => print_json(&service.teacher_stats(&id).await)?,
        Command::Global => print_json(&service.global_stats().await)?,
        Command::Recalculate => {
            let report = service.recalculate_all().await;
            let envelope = if report.failed.is_empty() {
                ApiResponse::ok(report, "recalculation complete")
            } else {
                ApiResponse::fail(Some(report), "some aggregates failed to recompute")
            };
            print_json(&envelope)?;
        }
        Command::Duplicates { kind } => match kind {
            DuplicateKind::Attendance => {
                let groups = service
                    .attendance_duplicates()
                    .await
                    .context("attendance duplicate audit failed")?;
                print_json(&groups)?;
            }
            DuplicateKind::Behavior => {
                let groups = service
                    .behavior_duplicates()
                    .await
                    .context("behavior duplicate audit failed")?;
                print_json(&groups)?;
            }
        },
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
