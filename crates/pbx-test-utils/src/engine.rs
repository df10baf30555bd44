//! [`FakeEngine`]: an in-memory telephony engine.
//!
//! Optionally bound to an endpoints file: every successful reload re-reads
//! that file, so writes made by a record-to-live sync become live state the
//! way they would on a real engine.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use pbx_core::mapping::live_from_document;
use pbx_core::{EngineControl, EngineError, LiveEntityState};
use pbx_fs::NormalizedPath;

#[derive(Debug, Default)]
struct FakeState {
    live: BTreeMap<String, LiveEntityState>,
    unreachable: bool,
    reload_failure: Option<String>,
    call_delay: Option<Duration>,
    reload_delay: Option<Duration>,
    reloads: usize,
    vanishing: BTreeSet<String>,
}

/// Scriptable [`EngineControl`] for tests.
#[derive(Debug, Default)]
pub struct FakeEngine {
    config_file: Option<NormalizedPath>,
    state: Mutex<FakeState>,
}

impl FakeEngine {
    /// An engine with no endpoints whose reloads change nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose reloads load endpoints from `config_file`.
    pub fn reading(config_file: NormalizedPath) -> Self {
        Self {
            config_file: Some(config_file),
            state: Mutex::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a live endpoint.
    pub fn set_live(&self, state: LiveEntityState) {
        self.state().live.insert(state.id.clone(), state);
    }

    pub fn remove_live(&self, id: &str) {
        self.state().live.remove(id);
    }

    /// Current live endpoints.
    pub fn live(&self) -> BTreeMap<String, LiveEntityState> {
        self.state().live.clone()
    }

    /// Make every call fail as if the engine were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Make reloads fail with `output` as the engine's text.
    pub fn fail_reloads(&self, output: impl Into<String>) {
        self.state().reload_failure = Some(output.into());
    }

    /// Delay list and detail calls, to trip timeouts.
    pub fn delay_calls(&self, delay: Duration) {
        self.state().call_delay = Some(delay);
    }

    /// Delay reloads, to trip timeouts.
    pub fn delay_reloads(&self, delay: Duration) {
        self.state().reload_delay = Some(delay);
    }

    /// Keep listing `id` but answer "not found" for its detail.
    pub fn vanish_on_detail(&self, id: &str) {
        self.state().vanishing.insert(id.to_string());
    }

    /// Number of reloads attempted so far.
    pub fn reload_count(&self) -> usize {
        self.state().reloads
    }

    async fn pause(delay: Option<Duration>) {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_reachable(&self) -> Result<(), EngineError> {
        if self.state().unreachable {
            return Err(EngineError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }

    fn load_config(&self) -> Result<Option<BTreeMap<String, LiveEntityState>>, EngineError> {
        let Some(path) = &self.config_file else {
            return Ok(None);
        };
        let text = match std::fs::read_to_string(path.to_native()) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(EngineError::Failed(e.to_string())),
        };
        let doc = pbx_config::parse(&text).map_err(|e| EngineError::Failed(e.to_string()))?;
        Ok(Some(live_from_document(&doc)))
    }
}

#[async_trait]
impl EngineControl for FakeEngine {
    async fn list_live_endpoints(&self) -> Result<Vec<String>, EngineError> {
        let delay = self.state().call_delay;
        Self::pause(delay).await;
        self.check_reachable()?;
        Ok(self.state().live.keys().cloned().collect())
    }

    async fn get_endpoint_detail(&self, id: &str) -> Result<Option<LiveEntityState>, EngineError> {
        let delay = self.state().call_delay;
        Self::pause(delay).await;
        self.check_reachable()?;
        let state = self.state();
        if state.vanishing.contains(id) {
            return Ok(None);
        }
        Ok(state.live.get(id).cloned())
    }

    async fn reload(&self) -> Result<String, EngineError> {
        let delay = self.state().reload_delay;
        Self::pause(delay).await;
        self.check_reachable()?;

        let failure = {
            let mut state = self.state();
            state.reloads += 1;
            state.reload_failure.clone()
        };
        if let Some(output) = failure {
            return Err(EngineError::Failed(output));
        }

        if let Some(live) = self.load_config()? {
            self.state().live = live;
        }
        Ok("Module 'res_pjsip.so' reloaded successfully.".to_string())
    }
}
