//! Serialized engine reloads

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::collector::DEFAULT_ENGINE_TIMEOUT;
use crate::engine::{EngineControl, EngineError};
use crate::{Error, Result};

/// Issues engine reloads one at a time, each bounded by a timeout
pub struct ReloadController {
    engine: Arc<dyn EngineControl>,
    in_flight: Mutex<()>,
    timeout: Duration,
}

impl ReloadController {
    pub fn new(engine: Arc<dyn EngineControl>) -> Self {
        Self {
            engine,
            in_flight: Mutex::new(()),
            timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reload the engine and return its output.
    ///
    /// # Errors
    ///
    /// - [`Error::Reload`] if the engine rejects the reload (with its raw
    ///   output) or does not finish within the timeout
    /// - [`Error::EngineUnreachable`] if the engine cannot be contacted
    pub async fn reload(&self) -> Result<String> {
        let _guard = self.in_flight.lock().await;
        tracing::debug!("Reloading engine");

        match tokio::time::timeout(self.timeout, self.engine.reload()).await {
            Ok(Ok(output)) => {
                tracing::info!(output = %output, "Engine reloaded");
                Ok(output)
            }
            Ok(Err(EngineError::Unreachable(message))) => {
                tracing::warn!(error = %message, "Engine unreachable during reload");
                Err(Error::EngineUnreachable { message })
            }
            Ok(Err(EngineError::Failed(output) | EngineError::Malformed(output))) => {
                tracing::warn!(output = %output, "Engine reload failed");
                Err(Error::Reload { output })
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Engine reload timed out");
                Err(Error::Reload {
                    output: "timed out".to_string(),
                })
            }
        }
    }
}
