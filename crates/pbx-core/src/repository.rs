//! Record repository contract and a TOML-file implementation
//!
//! The repository is the source of intended state. The admin panel's
//! database normally sits behind this trait; [`TomlRecordRepository`] keeps
//! the records in a single TOML file for standalone use.

use std::fs;
use std::io::ErrorKind;

use async_trait::async_trait;
use pbx_fs::NormalizedPath;
use pbx_fs::io::{self, RobustnessConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::model::EntityRecord;
use crate::{Error, Result, blocking};

/// Access to intended extension records
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<EntityRecord>>;

    async fn get(&self, id: &str) -> Result<Option<EntityRecord>>;

    /// Insert or replace the record with `record.id`
    async fn upsert(&self, record: EntityRecord) -> Result<()>;
}

/// On-disk layout of the records file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordFile {
    #[serde(default = "current_version")]
    version: String,
    #[serde(default, rename = "extension")]
    extensions: Vec<EntityRecord>,
}

fn current_version() -> String {
    "1".to_string()
}

/// Records stored as `[[extension]]` tables in a TOML file
///
/// Files are replaced atomically, so reads need no lock. An upsert holds
/// the file's `.lock` side-car from load to save, which serializes it with
/// upserts from other processes.
#[derive(Debug)]
pub struct TomlRecordRepository {
    path: NormalizedPath,
    robustness: RobustnessConfig,
    write_gate: Mutex<()>,
}

impl TomlRecordRepository {
    pub fn new(path: NormalizedPath) -> Self {
        Self {
            path,
            robustness: RobustnessConfig::default(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.robustness = robustness;
        self
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    async fn load(&self) -> Result<RecordFile> {
        let path = self.path.clone();
        blocking::run(move || load_file(&path)).await
    }
}

fn load_file(path: &NormalizedPath) -> Result<RecordFile> {
    let native = path.to_native();
    let content = match fs::read_to_string(&native) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(RecordFile {
                version: current_version(),
                extensions: Vec::new(),
            });
        }
        Err(e) => return Err(Error::repository(format!("{}: {}", native.display(), e))),
    };

    toml::from_str(&content).map_err(|e| Error::repository(format!("invalid records file {}: {}", native.display(), e)))
}

/// Save while the caller holds the side-car lock.
fn save_file(path: &NormalizedPath, records: &RecordFile, robustness: RobustnessConfig) -> Result<()> {
    let content = toml::to_string_pretty(records).map_err(Error::repository)?;
    io::write_unlocked(path, content.as_bytes(), robustness)
        .map_err(|e| Error::repository(format!("failed to save records: {}", e)))
}

#[async_trait]
impl RecordRepository for TomlRecordRepository {
    async fn list(&self) -> Result<Vec<EntityRecord>> {
        Ok(self.load().await?.extensions)
    }

    async fn get(&self, id: &str) -> Result<Option<EntityRecord>> {
        Ok(self.load().await?.extensions.into_iter().find(|r| r.id == id))
    }

    async fn upsert(&self, record: EntityRecord) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let path = self.path.clone();
        let robustness = self.robustness;

        blocking::run(move || {
            let _lock = io::lock_exclusive(&path, robustness.lock_timeout)
                .map_err(|e| Error::repository(format!("records file is busy: {}", e)))?;
            let mut file = load_file(&path)?;
            let id = record.id.clone();
            match file.extensions.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => file.extensions.push(record),
            }
            save_file(&path, &file, robustness)?;
            tracing::info!(id = %id, path = %path, "Record saved");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(temp: &TempDir) -> TomlRecordRepository {
        TomlRecordRepository::new(NormalizedPath::new(temp.path().join("extensions.toml")))
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let temp = TempDir::new().unwrap();

        assert!(repo(&temp).list().await.unwrap().is_empty());
        assert_eq!(repo(&temp).get("1001").await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_inserts_then_replaces() {
        let temp = TempDir::new().unwrap();
        let repo = repo(&temp);

        repo.upsert(EntityRecord::new("1001", "Alice")).await.unwrap();
        repo.upsert(EntityRecord::new("1002", "Bob")).await.unwrap();
        repo.upsert(EntityRecord::new("1001", "Alice B")).await.unwrap();

        let records = repo.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(repo.get("1001").await.unwrap().unwrap().name, "Alice B");
    }

    #[tokio::test]
    async fn invalid_file_is_repository_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("extensions.toml"), "not [valid").unwrap();

        let result = repo(&temp).list().await;

        assert!(matches!(result, Err(Error::Repository { .. })));
    }

    #[tokio::test]
    async fn upsert_waits_for_another_writer_and_reads_do_not() {
        let temp = TempDir::new().unwrap();
        let repo = repo(&temp).with_robustness(RobustnessConfig {
            lock_timeout: std::time::Duration::from_millis(50),
            enable_fsync: false,
        });
        repo.upsert(EntityRecord::new("1001", "Alice")).await.unwrap();

        let held = io::lock_exclusive(repo.path(), std::time::Duration::from_millis(50)).unwrap();
        let blocked = repo.upsert(EntityRecord::new("1002", "Bob")).await;
        assert!(matches!(blocked, Err(Error::Repository { ref message }) if message.contains("busy")));
        assert_eq!(repo.list().await.unwrap().len(), 1);

        drop(held);
        repo.upsert(EntityRecord::new("1002", "Bob")).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }
}
