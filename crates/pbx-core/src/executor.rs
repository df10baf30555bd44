//! Applying reconciliation results in either direction
//!
//! Every id is handled independently under its own lock, so one failure
//! never aborts the rest of a batch. Record-to-live batches end with at
//! most one engine reload, reported apart from the per-id outcomes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pbx_config::ConfigStore;
use pbx_fs::NormalizedPath;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::collector::LiveStateCollector;
use crate::lock::KeyedLocks;
use crate::reload::ReloadController;
use crate::repository::RecordRepository;
use crate::{Error, Result, blocking, mapping};

/// How many error messages an [`OperationSummary`] carries
pub const MAX_SUMMARY_ERRORS: usize = 5;

/// Which side is made to agree with the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Records are written into the engine configuration
    RecordToLive,
    /// Live endpoint state is copied into records
    LiveToRecord,
}

/// Outcome for one id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub id: String,
    pub success: bool,
    /// Whether anything was (or in a dry run, would be) modified
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Dry-run preview of the change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl ItemResult {
    fn ok(id: &str, changed: bool, diff: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            success: true,
            changed,
            error: None,
            diff,
        }
    }

    fn failed(id: &str, error: &Error) -> Self {
        Self {
            id: id.to_string(),
            success: false,
            changed: false,
            error: Some(error.to_string()),
            diff: None,
        }
    }
}

/// What happened to the engine reload after a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReloadStatus {
    /// Nothing was written, or the batch was a dry run
    NotNeeded,
    Reloaded { output: String },
    Failed { error: String },
}

/// Counts and leading error messages of an operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// At most [`MAX_SUMMARY_ERRORS`] messages
    pub errors: Vec<String>,
}

impl OperationSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }
}

/// Full result of a sync batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub direction: Direction,
    pub dry_run: bool,
    /// Set when the batch stopped early on request
    pub cancelled: bool,
    pub items: Vec<ItemResult>,
    pub reload: ReloadStatus,
}

impl BatchReport {
    fn new(run_id: Uuid, direction: Direction, dry_run: bool) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            direction,
            dry_run,
            cancelled: false,
            items: Vec::new(),
            reload: ReloadStatus::NotNeeded,
        }
    }

    /// True only if every item succeeded and the reload did not fail
    pub fn success(&self) -> bool {
        self.items.iter().all(|i| i.success) && !matches!(self.reload, ReloadStatus::Failed { .. })
    }

    pub fn summary(&self) -> OperationSummary {
        let mut errors: Vec<String> = Vec::new();
        if let ReloadStatus::Failed { error } = &self.reload {
            errors.push(format!("reload: {}", error));
        }
        errors.extend(
            self.items
                .iter()
                .filter_map(|i| i.error.as_ref().map(|e| format!("{}: {}", i.id, e))),
        );
        errors.truncate(MAX_SUMMARY_ERRORS);

        OperationSummary {
            succeeded: self.items.iter().filter(|i| i.success).count(),
            failed: self.items.iter().filter(|i| !i.success).count(),
            errors,
        }
    }
}

/// Requests cancellation of running batches
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by batches between items
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A connected handle and token
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx: Some(rx) })
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Per-batch switches
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Report what would change without writing or reloading
    pub dry_run: bool,
    pub cancel: CancelToken,
}

impl ApplyOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

/// Pushes changes between records and the engine
pub struct SyncExecutor {
    repository: Arc<dyn RecordRepository>,
    live: LiveStateCollector,
    store: ConfigStore,
    endpoints: NormalizedPath,
    reload: Arc<ReloadController>,
    locks: KeyedLocks,
}

impl SyncExecutor {
    pub fn new(
        repository: Arc<dyn RecordRepository>,
        live: LiveStateCollector,
        store: ConfigStore,
        endpoints: NormalizedPath,
        reload: Arc<ReloadController>,
    ) -> Self {
        Self {
            repository,
            live,
            store,
            endpoints,
            reload,
            locks: KeyedLocks::new(),
        }
    }

    /// Endpoint configuration file written by record-to-live syncs
    pub fn endpoints(&self) -> &NormalizedPath {
        &self.endpoints
    }

    /// Write each record's sections into the endpoints file, then reload once.
    pub async fn apply_record_to_live(&self, ids: &[String], options: &ApplyOptions) -> BatchReport {
        self.run_batch(Direction::RecordToLive, ids, options).await
    }

    /// Copy each endpoint's live state into its record.
    pub async fn apply_live_to_record(&self, ids: &[String], options: &ApplyOptions) -> BatchReport {
        self.run_batch(Direction::LiveToRecord, ids, options).await
    }

    async fn run_batch(&self, direction: Direction, ids: &[String], options: &ApplyOptions) -> BatchReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sync", %run_id, ?direction, dry_run = options.dry_run);

        async move {
            let mut report = BatchReport::new(run_id, direction, options.dry_run);

            for id in ids {
                if options.cancel.is_cancelled() {
                    tracing::info!(remaining = ids.len() - report.items.len(), "Batch cancelled");
                    report.cancelled = true;
                    break;
                }

                let _guard = self.locks.lock(id).await;
                let outcome = match direction {
                    Direction::RecordToLive => self.write_record(id, options.dry_run).await,
                    Direction::LiveToRecord => self.copy_live(id, options.dry_run).await,
                };

                report.items.push(match outcome {
                    Ok((changed, diff)) => {
                        tracing::debug!(id = %id, changed, "Item applied");
                        ItemResult::ok(id, changed, diff)
                    }
                    Err(e) => {
                        tracing::warn!(id = %id, error = %e, "Item failed");
                        ItemResult::failed(id, &e)
                    }
                });
            }

            let written = report.items.iter().filter(|i| i.success && i.changed).count();
            if direction == Direction::RecordToLive && !options.dry_run && written > 0 {
                report.reload = match self.reload.reload().await {
                    Ok(output) => ReloadStatus::Reloaded { output },
                    Err(e) => ReloadStatus::Failed { error: e.to_string() },
                };
            }

            let summary = report.summary();
            tracing::info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                written,
                cancelled = report.cancelled,
                "Sync batch finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn write_record(&self, id: &str, dry_run: bool) -> Result<(bool, Option<String>)> {
        mapping::validate_id(id)?;
        let record = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;
        mapping::validate_record(&record)?;

        let store = self.store.clone();
        let path = self.endpoints.clone();

        if dry_run {
            let diff = blocking::run(move || {
                let doc = mapping::apply_record(store.load(&path)?, &record);
                Ok(store.preview(&path, &doc)?)
            })
            .await?;
            let changed = !diff.is_empty();
            return Ok((changed, changed.then_some(diff)));
        }

        let outcome = blocking::run(move || Ok(store.update(&path, |doc| Ok(mapping::apply_record(doc, &record)))?)).await?;
        Ok((outcome.changed, None))
    }

    async fn copy_live(&self, id: &str, dry_run: bool) -> Result<(bool, Option<String>)> {
        let live = self.live.collect_one(id).await?.ok_or_else(|| Error::Conflict {
            id: id.to_string(),
            message: "endpoint is no longer present on the engine".to_string(),
        })?;

        let existing = self.repository.get(id).await?;
        let record = mapping::record_from_live(&live, existing.as_ref());
        if existing.as_ref() == Some(&record) {
            return Ok((false, None));
        }

        if dry_run {
            return Ok((true, Some(mapping::describe_changes(existing.as_ref(), &record))));
        }

        self.repository.upsert(record).await?;
        Ok((true, None))
    }
}
