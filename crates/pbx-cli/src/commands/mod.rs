//! Command implementations for pbx-cli

pub mod backup;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use pbx_core::{Settings, SettingsResolver};
use pbx_fs::NormalizedPath;

use crate::error::Result;

pub use backup::{run_backup, run_backups, run_cleanup, run_restore};
pub use status::run_status;
pub use sync::run_sync;

/// Layered settings for the given project file
pub fn resolve_settings(project_file: &Path) -> Result<Settings> {
    Ok(SettingsResolver::new(project_file).resolve()?)
}

/// `file` as an absolute [`NormalizedPath`], so backups land next to it
pub(crate) fn target_path(file: &Path) -> Result<NormalizedPath> {
    let absolute: PathBuf = std::path::absolute(file)?;
    Ok(NormalizedPath::new(absolute))
}
