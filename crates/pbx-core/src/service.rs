//! Operations offered to the surrounding application

use std::sync::Arc;
use std::time::Duration;

use pbx_config::ConfigStore;
use pbx_fs::{BackupEntry, BackupStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use crate::collector::{LiveStateCollector, RecordStateCollector};
use crate::engine::{AsteriskCli, EngineControl};
use crate::executor::{ApplyOptions, BatchReport, SyncExecutor};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::reload::ReloadController;
use crate::repository::{RecordRepository, TomlRecordRepository};
use crate::settings::Settings;
use crate::{Result, blocking};

/// Which ids a sync applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    One(String),
    /// Every id whose status the sync direction can change
    All,
}

/// Reconciliation, sync and backup operations over one engine and one
/// record repository
pub struct PbxSync {
    records: RecordStateCollector,
    live: LiveStateCollector,
    executor: SyncExecutor,
    store: ConfigStore,
}

impl PbxSync {
    pub fn new(
        engine: Arc<dyn EngineControl>,
        repository: Arc<dyn RecordRepository>,
        store: ConfigStore,
        endpoints: NormalizedPath,
        timeout: Duration,
    ) -> Self {
        let live = LiveStateCollector::new(Arc::clone(&engine)).with_timeout(timeout);
        let reload = Arc::new(ReloadController::new(engine).with_timeout(timeout));
        let executor = SyncExecutor::new(Arc::clone(&repository), live.clone(), store.clone(), endpoints, reload);

        Self {
            records: RecordStateCollector::new(repository),
            live,
            executor,
            store,
        }
    }

    /// Wire up the CLI engine and TOML repository described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let engine = AsteriskCli::new(&settings.engine.binary).with_reload_command(&settings.engine.reload_command);
        let repository = TomlRecordRepository::new(NormalizedPath::new(&settings.repository.path))
            .with_robustness(settings.files.robustness());

        Ok(Self::new(
            Arc::new(engine),
            Arc::new(repository),
            config_store(settings)?,
            NormalizedPath::new(&settings.files.endpoints),
            settings.engine.timeout(),
        ))
    }

    pub fn endpoints(&self) -> &NormalizedPath {
        self.executor.endpoints()
    }

    /// Collect both sides and classify every id.
    pub async fn get_sync_status(&self) -> Result<ReconcileReport> {
        let records = self.records.collect_all().await?;
        let live = self.live.collect_all().await?;
        Ok(Reconciler::reconcile(&records, &live))
    }

    /// Write records into the engine configuration and reload it.
    pub async fn sync_record_to_live(&self, target: Target, options: &ApplyOptions) -> Result<BatchReport> {
        let ids = match target {
            Target::One(id) => vec![id],
            Target::All => self.get_sync_status().await?.record_to_live_candidates(),
        };
        Ok(self.executor.apply_record_to_live(&ids, options).await)
    }

    /// Copy live endpoint state into records.
    pub async fn sync_live_to_record(&self, target: Target, options: &ApplyOptions) -> Result<BatchReport> {
        let ids = match target {
            Target::One(id) => vec![id],
            Target::All => self.get_sync_status().await?.live_to_record_candidates(),
        };
        Ok(self.executor.apply_live_to_record(&ids, options).await)
    }

    /// Back up `path` now; `None` if it does not exist.
    pub async fn backup_now(&self, path: &NormalizedPath) -> Result<Option<BackupEntry>> {
        let backups = self.store.backups().clone();
        let path = path.clone();
        blocking::run(move || Ok(backups.backup(&path)?)).await
    }

    /// Backups of `path`, newest first.
    pub async fn list_backups(&self, path: &NormalizedPath) -> Result<Vec<BackupEntry>> {
        let backups = self.store.backups().clone();
        let path = path.clone();
        blocking::run(move || Ok(backups.list(&path)?)).await
    }

    /// Put backup `backup_id` back in place of `path`.
    pub async fn restore_backup(&self, backup_id: &str, path: &NormalizedPath) -> Result<BackupEntry> {
        let store = self.store.clone();
        let backup_id = backup_id.to_string();
        let path = path.clone();
        blocking::run(move || Ok(store.restore(&backup_id, &path)?)).await
    }

    /// Delete all but the `keep` newest backups of `path`; returns the removed ones.
    pub async fn cleanup_backups(&self, path: &NormalizedPath, keep: usize) -> Result<Vec<BackupEntry>> {
        let backups = self.store.backups().clone();
        let path = path.clone();
        blocking::run(move || Ok(backups.cleanup(&path, keep)?)).await
    }
}

/// The [`ConfigStore`] described by `settings`, without touching the engine.
pub fn config_store(settings: &Settings) -> Result<ConfigStore> {
    let robustness = settings.files.robustness();
    let mut backups = BackupStore::new()
        .with_tag(&settings.backup.tag)?
        .with_robustness(robustness);
    if let Some(dir) = &settings.files.backup_dir {
        backups = backups.with_backup_dir(NormalizedPath::new(dir));
    }

    let store = ConfigStore::new(backups).with_robustness(robustness);
    Ok(match settings.backup.keep {
        Some(keep) => store.with_retention(keep),
        None => store,
    })
}
