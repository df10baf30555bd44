//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pbx_core::settings::PROJECT_FILE;

/// pbx-sync - Reconcile extension records with a running PBX
#[derive(Parser, Debug)]
#[command(name = "pbxsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project settings file
    #[arg(short, long, global = true, env = "PBXSYNC_CONFIG", default_value = PROJECT_FILE)]
    pub config: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Which side a sync writes to
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Write records into the endpoints file and reload the engine
    Live,
    /// Copy live endpoint state into the records
    Records,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Compare records with live endpoints
    Status {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Make one side agree with the other
    ///
    /// Without an ID every extension that differs is synced.
    ///
    /// Examples:
    ///   pbxsync sync --to live              # Push all pending records
    ///   pbxsync sync --to live 1001         # Push one extension
    ///   pbxsync sync --to records --dry-run # Preview pulling live state
    Sync {
        /// Side to write to
        #[arg(long, value_enum)]
        to: SyncDirection,

        /// Extension id; all differing extensions when omitted
        id: Option<String>,

        /// Preview changes without applying them
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Back up a configuration file now
    Backup {
        /// File to back up
        file: PathBuf,
    },

    /// List backups of a configuration file, newest first
    Backups {
        /// File whose backups are listed
        file: PathBuf,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Restore a configuration file from a backup
    Restore {
        /// Backup id as shown by `pbxsync backups`
        id: String,

        /// File to restore
        file: PathBuf,
    },

    /// Delete all but the newest backups of a configuration file
    Cleanup {
        /// File whose backups are pruned
        file: PathBuf,

        /// Number of backups to keep
        #[arg(long)]
        keep: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_parses_direction_and_id() {
        let cli = Cli::parse_from(["pbxsync", "sync", "--to", "live", "1001", "--dry-run"]);

        assert_eq!(
            cli.command,
            Commands::Sync {
                to: SyncDirection::Live,
                id: Some("1001".to_string()),
                dry_run: true,
                json: false,
            }
        );
        assert_eq!(cli.config, PathBuf::from(PROJECT_FILE));
    }

    #[test]
    fn cleanup_requires_keep() {
        assert!(Cli::try_parse_from(["pbxsync", "cleanup", "pjsip.conf"]).is_err());
    }
}
