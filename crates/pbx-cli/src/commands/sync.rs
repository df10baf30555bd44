//! Sync command implementation

use colored::Colorize;
use pbx_core::{ApplyOptions, BatchReport, CancelToken, Direction, PbxSync, ReloadStatus, Settings, Target};

use crate::cli::SyncDirection;
use crate::error::{CliError, Result};

/// Run the sync command
///
/// Ctrl-C stops the batch before the next extension; finished items stay applied.
pub async fn run_sync(
    settings: &Settings,
    to: SyncDirection,
    id: Option<String>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let service = PbxSync::from_settings(settings)?;
    let target = id.map_or(Target::All, Target::One);

    let (handle, cancel) = CancelToken::pair();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    let options = ApplyOptions { dry_run, cancel };

    let result = match to {
        SyncDirection::Live => service.sync_record_to_live(target, &options).await,
        SyncDirection::Records => service.sync_live_to_record(target, &options).await,
    };
    interrupt.abort();
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_batch(&report));
    }

    check_outcome(&report)
}

fn check_outcome(report: &BatchReport) -> Result<()> {
    if report.cancelled {
        return Err(CliError::user("sync cancelled"));
    }
    if report.success() {
        return Ok(());
    }

    let summary = report.summary();
    Err(CliError::user(format!(
        "sync finished with errors ({} succeeded, {} failed)",
        summary.succeeded, summary.failed
    )))
}

fn render_batch(report: &BatchReport) -> String {
    let mut out = String::new();
    let heading = match report.direction {
        Direction::RecordToLive => "Syncing records to live",
        Direction::LiveToRecord => "Syncing live state to records",
    };
    out.push_str(&format!("{} {}", "=>".blue().bold(), heading));
    if report.dry_run {
        out.push_str(&format!(" {}", "(dry run)".yellow()));
    }
    out.push('\n');

    if report.items.is_empty() && !report.cancelled {
        out.push_str(&format!("{} Nothing to sync.\n", "OK".green().bold()));
        return out;
    }

    for item in &report.items {
        let label = match (&item.error, item.changed) {
            (Some(_), _) => "FAILED".red().bold(),
            (None, true) if report.dry_run => "WOULD CHANGE".yellow().bold(),
            (None, true) => "CHANGED".green().bold(),
            (None, false) => "UNCHANGED".dimmed(),
        };
        out.push_str(&format!("   {} {}", label, item.id.cyan()));
        if let Some(error) = &item.error {
            out.push_str(&format!(": {}", error));
        }
        out.push('\n');
        if let Some(diff) = &item.diff {
            for line in diff.lines() {
                out.push_str(&format!("      {}\n", line));
            }
        }
    }

    match &report.reload {
        ReloadStatus::NotNeeded => {}
        ReloadStatus::Reloaded { .. } => out.push_str(&format!("{} Engine reloaded\n", "OK".green().bold())),
        ReloadStatus::Failed { error } => out.push_str(&format!("{} {}\n", "RELOAD FAILED".red().bold(), error)),
    }
    if report.cancelled {
        out.push_str(&format!("{} Cancelled before all items ran\n", "!".yellow().bold()));
    }

    let summary = report.summary();
    out.push_str(&format!("{} succeeded, {} failed\n", summary.succeeded, summary.failed));
    out
}
