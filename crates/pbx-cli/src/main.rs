//! pbx-sync CLI
//!
//! Reports and repairs drift between extension records and the PBX, and
//! manages backups of its configuration files.

mod cli;
mod commands;
mod error;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::Result;

/// Log filter when neither `RUST_LOG` nor `--verbose` is given
const DEFAULT_LOG_FILTER: &str = "warn,pbx_core=info,pbx_config=info,pbx_fs=info";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = commands::resolve_settings(&cli.config)?;
    match cli.command {
        Commands::Status { json } => commands::run_status(&settings, json).await,
        Commands::Sync {
            to,
            id,
            dry_run,
            json,
        } => commands::run_sync(&settings, to, id, dry_run, json).await,
        Commands::Backup { file } => commands::run_backup(&settings, &file).await,
        Commands::Backups { file, json } => commands::run_backups(&settings, &file, json).await,
        Commands::Restore { id, file } => commands::run_restore(&settings, &id, &file).await,
        Commands::Cleanup { file, keep } => commands::run_cleanup(&settings, &file, keep).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
    if installed.is_ok() {
        tracing::debug!("Verbose mode enabled");
    }
}
