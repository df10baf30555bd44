//! Snapshot collection of both sides of the reconciliation

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{EngineControl, EngineError};
use crate::model::{EntityRecord, LiveEntityState};
use crate::repository::RecordRepository;
use crate::{Error, Result};

/// Default bound on a single engine call
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads the endpoints the engine is running
#[derive(Clone)]
pub struct LiveStateCollector {
    engine: Arc<dyn EngineControl>,
    timeout: Duration,
}

impl LiveStateCollector {
    pub fn new(engine: Arc<dyn EngineControl>) -> Self {
        Self {
            engine,
            timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Every live endpoint keyed by id.
    ///
    /// Endpoints that disappear between listing and detail are skipped.
    pub async fn collect_all(&self) -> Result<BTreeMap<String, LiveEntityState>> {
        let ids = self.bounded("list endpoints", self.engine.list_live_endpoints()).await?;

        let mut states = BTreeMap::new();
        for id in ids {
            match self.collect_one(&id).await? {
                Some(state) => {
                    states.insert(id, state);
                }
                None => tracing::debug!(id = %id, "Endpoint vanished during collection"),
            }
        }

        tracing::debug!(count = states.len(), "Collected live endpoints");
        Ok(states)
    }

    /// One endpoint, or `None` if the engine no longer runs it.
    pub async fn collect_one(&self, id: &str) -> Result<Option<LiveEntityState>> {
        self.bounded("endpoint detail", self.engine.get_endpoint_detail(id))
            .await
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = std::result::Result<T, EngineError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(EngineError::Failed(output))) => Err(Error::EngineUnreachable {
                message: format!("{} failed: {}", what, output),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::EngineUnreachable {
                message: format!("{} timed out after {}ms", what, self.timeout.as_millis()),
            }),
        }
    }
}

/// Reads intended records from the repository
#[derive(Clone)]
pub struct RecordStateCollector {
    repository: Arc<dyn RecordRepository>,
}

impl RecordStateCollector {
    pub fn new(repository: Arc<dyn RecordRepository>) -> Self {
        Self { repository }
    }

    /// Every record keyed by id. Later duplicates of an id win.
    pub async fn collect_all(&self) -> Result<BTreeMap<String, EntityRecord>> {
        let records = self.repository.list().await.map_err(|e| match e {
            Error::Repository { .. } => e,
            other => Error::repository(other),
        })?;

        Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect())
    }
}
