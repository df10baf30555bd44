//! [`MemoryRecordRepository`]: records held in a map.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use pbx_core::{EntityRecord, Error, RecordRepository, Result};

/// In-memory [`RecordRepository`] that can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryRecordRepository {
    records: Mutex<BTreeMap<String, EntityRecord>>,
    failing: AtomicBool,
}

impl MemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        let repo = Self::new();
        repo.records().extend(records.into_iter().map(|r| (r.id.clone(), r)));
        repo
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<String, EntityRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every call return a repository error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, record: EntityRecord) {
        self.records().insert(record.id.clone(), record);
    }

    pub fn remove(&self, id: &str) {
        self.records().remove(id);
    }

    /// Copy of a stored record.
    pub fn snapshot(&self, id: &str) -> Option<EntityRecord> {
        self.records().get(id).cloned()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Repository {
                message: "database unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for MemoryRecordRepository {
    async fn list(&self) -> Result<Vec<EntityRecord>> {
        self.check()?;
        Ok(self.records().values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<EntityRecord>> {
        self.check()?;
        Ok(self.records().get(id).cloned())
    }

    async fn upsert(&self, record: EntityRecord) -> Result<()> {
        self.check()?;
        self.insert(record);
        Ok(())
    }
}
