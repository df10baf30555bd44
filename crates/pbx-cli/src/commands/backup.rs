//! Backup, backups, restore and cleanup command implementations

use std::path::Path;

use colored::Colorize;
use pbx_core::{PbxSync, Settings};
use pbx_fs::BackupEntry;

use crate::commands::target_path;
use crate::error::Result;

/// Run the backup command
pub async fn run_backup(settings: &Settings, file: &Path) -> Result<()> {
    let path = target_path(file)?;
    let service = PbxSync::from_settings(settings)?;

    match service.backup_now(&path).await? {
        Some(entry) => println!("{} Backed up to {}", "OK".green().bold(), entry.id.cyan()),
        None => println!("{} {} does not exist, nothing to back up", "!".yellow().bold(), path),
    }
    Ok(())
}

/// Run the backups command
pub async fn run_backups(settings: &Settings, file: &Path, json: bool) -> Result<()> {
    let path = target_path(file)?;
    let service = PbxSync::from_settings(settings)?;
    let entries = service.list_backups(&path).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{} {}", "Backups of".bold(), path.as_str().bold());
    if entries.is_empty() {
        println!("  {}", "None".dimmed());
    }
    for entry in &entries {
        println!("  {}", render_entry(entry));
    }
    Ok(())
}

/// Run the restore command
pub async fn run_restore(settings: &Settings, id: &str, file: &Path) -> Result<()> {
    let path = target_path(file)?;
    let service = PbxSync::from_settings(settings)?;

    let entry = service.restore_backup(id, &path).await?;
    println!("{} Restored {} from {}", "OK".green().bold(), path, entry.id.cyan());
    Ok(())
}

/// Run the cleanup command
pub async fn run_cleanup(settings: &Settings, file: &Path, keep: usize) -> Result<()> {
    let path = target_path(file)?;
    let service = PbxSync::from_settings(settings)?;

    let removed = service.cleanup_backups(&path, keep).await?;
    for entry in &removed {
        println!("   {} {}", "-".red(), entry.id);
    }
    println!("{} Removed {} backup(s), kept at most {}", "OK".green().bold(), removed.len(), keep);
    Ok(())
}

fn render_entry(entry: &BackupEntry) -> String {
    let hex = entry.content_hash.trim_start_matches("sha256:");
    let short_hash: String = hex.chars().take(12).collect();
    format!(
        "{}  {}  {}",
        entry.id.cyan(),
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        short_hash.dimmed()
    )
}
