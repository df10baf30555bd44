//! Settings resolution with hierarchical merge
//!
//! Settings are merged from, in order:
//! 1. Built-in defaults
//! 2. Global settings (`<config_dir>/pbx-sync/config.toml`)
//! 3. Project settings (`pbxsync.toml` or the file given on the command line)
//! 4. Local overrides next to the project file (`pbxsync.local.toml`)
//!
//! Later layers override earlier ones key by key; missing layers are skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pbx_fs::RobustnessConfig;
use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_RELOAD_COMMAND;
use crate::{Error, Result};

/// Default project settings file name
pub const PROJECT_FILE: &str = "pbxsync.toml";

/// Effective settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub files: FileSettings,
    pub backup: BackupSettings,
    pub engine: EngineSettings,
    pub repository: RepositorySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    /// Endpoint configuration file written by record-to-live syncs
    pub endpoints: PathBuf,
    /// Where backups go; next to the source file when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    /// How long a write waits for another process's file lock
    pub lock_timeout_ms: u64,
    /// Flush written files to disk before they replace the original
    pub fsync: bool,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            endpoints: PathBuf::from("/etc/asterisk/pjsip.conf"),
            backup_dir: None,
            lock_timeout_ms: 5000,
            fsync: true,
        }
    }
}

impl FileSettings {
    pub fn robustness(&self) -> RobustnessConfig {
        RobustnessConfig {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            enable_fsync: self.fsync,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Middle component of backup names
    pub tag: String,
    /// Backups kept per file after each write; unlimited when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep: Option<usize>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            tag: pbx_fs::backup::DEFAULT_TAG.to_string(),
            keep: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub binary: String,
    /// Bound on every engine call
    pub timeout_ms: u64,
    pub reload_command: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            binary: "asterisk".to_string(),
            timeout_ms: 5000,
            reload_command: DEFAULT_RELOAD_COMMAND.to_string(),
        }
    }
}

impl EngineSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// TOML file holding the extension records
    pub path: PathBuf,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/pbx-sync/extensions.toml"),
        }
    }
}

/// Resolves [`Settings`] from the layered files
pub struct SettingsResolver {
    project_file: PathBuf,
    /// Override for the global config directory (used for testing).
    global_config_dir_override: Option<PathBuf>,
}

impl SettingsResolver {
    pub fn new(project_file: impl Into<PathBuf>) -> Self {
        Self {
            project_file: project_file.into(),
            global_config_dir_override: None,
        }
    }

    /// Use `dir` instead of the platform config directory for the global layer.
    pub fn with_global_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.global_config_dir_override = Some(dir.into());
        self
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.global_config_dir_override {
            return Some(dir.clone());
        }
        dirs::config_dir().map(|d| d.join("pbx-sync"))
    }

    /// `pbxsync.toml` → `pbxsync.local.toml`
    pub fn local_file(&self) -> PathBuf {
        let stem = self
            .project_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pbxsync".to_string());
        self.project_file.with_file_name(format!("{}.local.toml", stem))
    }

    pub fn resolve(&self) -> Result<Settings> {
        let mut merged = toml::Table::try_from(Settings::default()).map_err(|e| Error::Config {
            path: PathBuf::from("<defaults>"),
            message: e.to_string(),
        })?;

        if let Some(global_dir) = self.global_config_dir() {
            let global_file = global_dir.join("config.toml");
            merge_layer(&mut merged, &global_file, "global")?;
        }
        merge_layer(&mut merged, &self.project_file, "project")?;
        merge_layer(&mut merged, &self.local_file(), "local")?;

        let settings: Settings = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config {
                path: self.project_file.clone(),
                message: e.to_string(),
            })?;

        if settings.engine.timeout_ms == 0 {
            return Err(Error::Config {
                path: self.project_file.clone(),
                message: "engine.timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(settings)
    }
}

fn merge_layer(merged: &mut toml::Table, path: &Path, layer: &str) -> Result<()> {
    if !path.is_file() {
        tracing::debug!(?path, layer, "No settings file, skipping");
        return Ok(());
    }
    tracing::debug!(?path, layer, "Loading settings");

    let content = fs::read_to_string(path).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let table: toml::Table = toml::from_str(&content).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    deep_merge(merged, table);
    Ok(())
}

fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => deep_merge(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
