//! Status command implementation

use colored::Colorize;
use pbx_core::{PbxSync, ReconcileReport, Settings, SyncStatus};

use crate::error::Result;

/// Run the status command
pub async fn run_status(settings: &Settings, json: bool) -> Result<()> {
    let service = PbxSync::from_settings(settings)?;
    let report = service.get_sync_status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

fn render_report(report: &ReconcileReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", "Sync Status".bold()));

    if report.statuses.is_empty() {
        out.push_str(&format!("  {} no extensions on either side\n", "None".dimmed()));
        return out;
    }

    for (id, status) in &report.statuses {
        let label = status.label();
        let line = match status {
            SyncStatus::Matched => format!("  {} {} ({})", "=".green(), id.cyan(), label.green()),
            SyncStatus::RecordOnly => format!("  {} {} ({})", "+".yellow(), id.cyan(), label.yellow()),
            SyncStatus::LiveOnly => format!("  {} {} ({})", "-".yellow(), id.cyan(), label.yellow()),
            SyncStatus::Mismatched { .. } => format!("  {} {} ({})", "!".red(), id.cyan(), label.red()),
        };
        out.push_str(&line);
        out.push('\n');

        if let SyncStatus::Mismatched { fields } = status {
            for (field, diff) in fields {
                out.push_str(&format!(
                    "      {}: record '{}', live '{}'\n",
                    field.as_str().dimmed(),
                    diff.record,
                    diff.live
                ));
            }
        }
    }

    let counts = &report.counts;
    out.push_str(&format!(
        "\n{} matched, {} record only, {} live only, {} mismatched\n",
        counts.matched, counts.record_only, counts.live_only, counts.mismatched
    ));
    if report.is_in_sync() {
        out.push_str(&format!("{} Records and engine agree.\n", "OK".green().bold()));
    } else {
        out.push_str(&format!(
            "Run {} or {} to repair.\n",
            "pbxsync sync --to live".cyan(),
            "pbxsync sync --to records".cyan()
        ));
    }
    out
}
