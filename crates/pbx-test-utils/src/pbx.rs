//! [`TestPbx`] harness and record fixtures.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pbx_config::ConfigStore;
use pbx_core::{EntityRecord, PbxSync};
use pbx_fs::NormalizedPath;
use tempfile::TempDir;

use crate::{FakeEngine, MemoryRecordRepository};

/// Engine timeout used by [`TestPbx::service`].
pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

/// A complete, enabled record with a secret and two codecs.
pub fn record(id: &str) -> EntityRecord {
    EntityRecord {
        id: id.to_string(),
        name: format!("Extension {}", id),
        secret: Some(format!("pw-{}", id)),
        codecs: vec!["ulaw".to_string(), "alaw".to_string()],
        context: "internal".to_string(),
        transport: "transport-udp".to_string(),
        enabled: true,
    }
}

/// A temporary directory holding an endpoints file, a [`FakeEngine`] that
/// loads it on reload and an in-memory record repository.
///
/// # Example
///
/// ```rust,no_run
/// use pbx_test_utils::{TestPbx, record};
///
/// let pbx = TestPbx::new();
/// pbx.repository.insert(record("1001"));
/// pbx.write_endpoints("[general]\n");
/// let service = pbx.service();
/// ```
pub struct TestPbx {
    temp_dir: TempDir,
    endpoints: NormalizedPath,
    pub engine: Arc<FakeEngine>,
    pub repository: Arc<MemoryRecordRepository>,
}

impl Default for TestPbx {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPbx {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let endpoints = NormalizedPath::new(temp_dir.path().join("pjsip.conf"));
        Self {
            engine: Arc::new(FakeEngine::reading(endpoints.clone())),
            repository: Arc::new(MemoryRecordRepository::new()),
            temp_dir,
            endpoints,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of the endpoints file, which need not exist yet.
    pub fn endpoints(&self) -> &NormalizedPath {
        &self.endpoints
    }

    pub fn write_endpoints(&self, content: &str) {
        fs::write(self.endpoints.to_native(), content).unwrap();
    }

    /// Endpoints file content, empty when missing.
    pub fn read_endpoints(&self) -> String {
        fs::read_to_string(self.endpoints.to_native()).unwrap_or_default()
    }

    /// Service over this harness with default backups and [`TEST_TIMEOUT`].
    pub fn service(&self) -> PbxSync {
        self.service_with(ConfigStore::default(), TEST_TIMEOUT)
    }

    pub fn service_with(&self, store: ConfigStore, timeout: Duration) -> PbxSync {
        PbxSync::new(
            self.engine.clone(),
            self.repository.clone(),
            store,
            self.endpoints.clone(),
            timeout,
        )
    }
}
