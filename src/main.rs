use anyhow::Context;
use clap::Parser;
use initiative_reconcile_lib::config::{ConfigOverrides, ReconcileConfig};
use initiative_reconcile_lib::{init_tracing, run, RunOutcome};
use std::path::PathBuf;
use std::process::ExitCode;

/// Merge legacy initiative, user and audit records into the canonical store.
#[derive(Debug, Parser)]
#[command(name = "initiative-reconcile", version)]
struct Cli {
    /// Optional YAML config file; flags and env vars override it.
    #[arg(long, env = "RECONCILE_CONFIG")]
    config: Option<PathBuf>,

    /// Canonical SQLite store to write into.
    #[arg(long, env = "RECONCILE_TARGET_DB")]
    target_db: Option<PathBuf>,

    /// Legacy SQLite database to read initiatives, scores and audit logs from.
    #[arg(long, env = "RECONCILE_LEGACY_DB")]
    legacy_db: Option<PathBuf>,

    /// Directory holding the flat JSON exports.
    #[arg(long, env = "RECONCILE_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Client-state snapshot; defaults to legacy-state.json under the data root.
    #[arg(long, env = "RECONCILE_CLIENT_STATE")]
    client_state: Option<PathBuf>,

    #[arg(long, env = "RECONCILE_REPORT_DIR")]
    report_dir: Option<PathBuf>,

    #[arg(long, env = "RECONCILE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, env = "RECONCILE_DEFAULT_LOCALE")]
    default_locale: Option<String>,

    #[arg(long, env = "RECONCILE_DEFAULT_DEPARTMENT")]
    default_department: Option<String>,

    /// Run against an in-memory store; the report is still written.
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            target_db: self.target_db.clone(),
            legacy_db: self.legacy_db.clone(),
            data_root: self.data_root.clone(),
            client_state: self.client_state.clone(),
            report_dir: self.report_dir.clone(),
            log_dir: self.log_dir.clone(),
            default_locale: self.default_locale.clone(),
            default_department: self.default_department.clone(),
            dry_run: self.dry_run,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match ReconcileConfig::load(cli.config.as_deref(), cli.overrides()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = init_tracing(&config.log_dir) {
        eprintln!("failed to initialise logging: {error}");
    }

    match execute(&config) {
        Ok(outcome) => {
            println!("{}", outcome.report_path.to_string_lossy());
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "reconciliation aborted");
            ExitCode::FAILURE
        }
    }
}

fn execute(config: &ReconcileConfig) -> anyhow::Result<RunOutcome> {
    run(config).context("reconciliation run failed")
}
