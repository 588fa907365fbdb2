pub mod canonical;
pub mod config;
pub mod db;
pub mod errors;
pub mod fingerprint;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod writer;

use crate::config::ReconcileConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::pipeline::{run_pipeline, RunContext};
use crate::report::{write_report, RunReport};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub report_path: PathBuf,
}

/// Runs one reconciliation pass and writes its report.
///
/// Only a failure to open the target store (or to write the report) is
/// returned as an error; every per-record failure lands in the report.
pub fn run(config: &ReconcileConfig) -> AppResult<RunOutcome> {
    config.validate()?;
    let started_at = Utc::now();
    let db = open_target(config)?;
    tracing::info!(
        target_db = %config.target_db.to_string_lossy(),
        dry_run = config.dry_run,
        "starting reconciliation run"
    );

    let mut ctx = RunContext::new(started_at, config.dry_run);
    run_pipeline(config, &db, &mut ctx);
    let report = ctx.finish();

    let report_path = write_report(&report, &config.report_dir)?;
    tracing::info!(
        inserted = report.inserted,
        skipped = report.skipped,
        updated = report.updated,
        errors = report.errors.len(),
        report = %report_path.to_string_lossy(),
        "reconciliation run finished"
    );
    Ok(RunOutcome { report, report_path })
}

fn open_target(config: &ReconcileConfig) -> AppResult<Database> {
    let opened = if config.dry_run {
        Database::open_in_memory()
    } else {
        Database::new(&config.target_db)
    };
    opened.map_err(|error| {
        AppError::Startup(format!(
            "cannot open target store {}: {}",
            config.target_db.to_string_lossy(),
            error
        ))
    })
}

/// Human-readable stderr output plus a JSON log file rolled daily.
pub fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "reconcile.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
        .try_init()
        .map_err(|error| error.to_string())
}
