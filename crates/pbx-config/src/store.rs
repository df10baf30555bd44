//! Read-modify-write access to configuration files
//!
//! Every write goes through the same sequence under a per-path lock:
//! check the file still matches what was loaded, skip if nothing changed,
//! back up the current content, then replace the file atomically.

use std::fs;
use std::path::Path;

use pbx_fs::checksum::compute_bytes_checksum;
use pbx_fs::io::{self, RobustnessConfig};
use pbx_fs::{BackupEntry, BackupStore, NormalizedPath, PathLocks};
use serde::Serialize;
use similar::TextDiff;

use crate::document::{ConfigDocument, SourceSnapshot};
use crate::parser::parse_at;
use crate::{Error, Result};

/// Result of [`ConfigStore::write`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    /// False when the rendered document equalled the file and nothing was written
    pub changed: bool,
    /// Backup taken of the previous content, if the file existed
    pub backup: Option<BackupEntry>,
}

/// Loads and writes [`ConfigDocument`]s.
///
/// Cloning shares the lock registry, so clones serialize against each
/// other.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    backups: BackupStore,
    locks: PathLocks,
    robustness: RobustnessConfig,
    retention: Option<usize>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(BackupStore::default())
    }
}

impl ConfigStore {
    pub fn new(backups: BackupStore) -> Self {
        Self {
            backups,
            locks: PathLocks::new(),
            robustness: RobustnessConfig::default(),
            retention: None,
        }
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.robustness = robustness;
        self
    }

    /// Prune to the `keep` newest backups after every successful write.
    pub fn with_retention(mut self, keep: usize) -> Self {
        self.retention = Some(keep);
        self
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Load and parse `path`. A missing file yields an empty document.
    pub fn load(&self, path: &NormalizedPath) -> Result<ConfigDocument> {
        self.locks.with_lock(path, || self.load_unlocked(path))
    }

    /// See [`ConfigDocument::upsert_section`].
    pub fn upsert_section<K, V>(
        &self,
        doc: ConfigDocument,
        section_type: &str,
        name: &str,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> ConfigDocument
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        doc.upsert_section(section_type, name, attributes)
    }

    /// See [`ConfigDocument::remove_section`].
    pub fn remove_section(&self, doc: ConfigDocument, section_type: &str, name: &str) -> ConfigDocument {
        doc.remove_section(section_type, name)
    }

    /// Persist `doc` to `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::Conflict`] if the file changed since `doc` was loaded
    /// - [`Error::Write`] if the new content could not be committed; the
    ///   file keeps its previous content
    pub fn write(&self, path: &NormalizedPath, doc: &ConfigDocument) -> Result<WriteOutcome> {
        self.write_with_commit(path, doc, |temp, target| fs::rename(temp, target))
    }

    /// [`ConfigStore::write`] with a caller-supplied commit step, used to
    /// exercise failures during the final rename.
    pub fn write_with_commit<F>(&self, path: &NormalizedPath, doc: &ConfigDocument, commit: F) -> Result<WriteOutcome>
    where
        F: FnOnce(&Path, &Path) -> std::io::Result<()>,
    {
        self.locks.with_lock(path, || {
            self.write_unlocked(path, doc, commit, |path, keep| self.backups.cleanup(path, keep))
        })
    }

    /// Load, transform and write `path` as one critical section.
    ///
    /// Concurrent updates of the same file are applied one after the other,
    /// each seeing the previous one's result.
    pub fn update<F>(&self, path: &NormalizedPath, transform: F) -> Result<WriteOutcome>
    where
        F: FnOnce(ConfigDocument) -> Result<ConfigDocument>,
    {
        self.locks.with_lock(path, || {
            let doc = self.load_unlocked(path)?;
            let doc = transform(doc)?;
            self.write_unlocked(
                path,
                &doc,
                |temp, target| fs::rename(temp, target),
                |path, keep| self.backups.cleanup(path, keep),
            )
        })
    }

    /// Unified diff between the file on disk and `doc`. Empty if identical.
    pub fn preview(&self, path: &NormalizedPath, doc: &ConfigDocument) -> Result<String> {
        let current = match self.locks.with_lock(path, || io::read_optional(path))? {
            Some(bytes) => decode(path, bytes)?,
            None => String::new(),
        };
        let proposed = doc.render();

        if current == proposed {
            return Ok(String::new());
        }

        let label = path.as_str();
        Ok(TextDiff::from_lines(&current, &proposed)
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{}", label), &format!("b/{}", label))
            .to_string())
    }

    /// Restore a backup onto `path`, serialized with writes to the same file.
    pub fn restore(&self, backup_id: &str, path: &NormalizedPath) -> Result<BackupEntry> {
        self.locks
            .with_lock(path, || self.backups.restore(backup_id, path))
            .map_err(Error::from)
    }

    fn load_unlocked(&self, path: &NormalizedPath) -> Result<ConfigDocument> {
        let Some(bytes) = io::read_optional(path)? else {
            tracing::debug!(path = %path, "Config file absent, starting empty");
            let mut doc = ConfigDocument::empty();
            doc.path = Some(path.clone());
            doc.snapshot = SourceSnapshot::Missing;
            return Ok(doc);
        };

        let snapshot = SourceSnapshot::Content(compute_bytes_checksum(&bytes));
        let text = decode(path, bytes)?;
        let doc = parse_at(&text, Some(path), snapshot)?;
        tracing::debug!(path = %path, sections = doc.sections().len(), "Loaded config");
        Ok(doc)
    }

    fn write_unlocked<F, P>(
        &self,
        path: &NormalizedPath,
        doc: &ConfigDocument,
        commit: F,
        prune: P,
    ) -> Result<WriteOutcome>
    where
        F: FnOnce(&Path, &Path) -> std::io::Result<()>,
        P: FnOnce(&NormalizedPath, usize) -> pbx_fs::Result<Vec<BackupEntry>>,
    {
        let current = io::read_optional(path)?;
        let actual = match &current {
            Some(bytes) => SourceSnapshot::Content(compute_bytes_checksum(bytes)),
            None => SourceSnapshot::Missing,
        };
        if *doc.snapshot() != SourceSnapshot::Detached && *doc.snapshot() != actual {
            tracing::warn!(path = %path, "Config changed on disk since load");
            return Err(Error::Conflict {
                path: path.to_native(),
                expected: doc.snapshot().describe(),
                actual: actual.describe(),
            });
        }

        let rendered = doc.render();
        if current.as_deref() == Some(rendered.as_bytes()) {
            tracing::debug!(path = %path, "Config unchanged, skipping write");
            return Ok(WriteOutcome {
                changed: false,
                backup: None,
            });
        }

        let backup = self.backups.backup(path)?;
        io::write_atomic_with_commit(path, rendered.as_bytes(), self.robustness, commit).map_err(|source| {
            Error::Write {
                path: path.to_native(),
                source,
            }
        })?;

        // Committed from here on: pruning failures are logged, not returned
        if let Some(keep) = self.retention {
            if let Err(e) = prune(path, keep) {
                tracing::warn!(path = %path, keep, error = %e, "Backup retention failed");
            }
        }

        tracing::info!(
            path = %path,
            backup = backup.as_ref().map(|b| b.id.as_str()).unwrap_or("-"),
            "Config written"
        );
        Ok(WriteOutcome {
            changed: true,
            backup,
        })
    }
}

/// Decode configuration text, rejecting invalid UTF-8.
fn decode(path: &NormalizedPath, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| {
        let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
        Error::Parse {
            path: path.to_native(),
            line: valid.iter().filter(|b| **b == b'\n').count() + 1,
            message: "file is not valid UTF-8".to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use tempfile::TempDir;

    #[test]
    fn failed_retention_still_reports_the_write() {
        let temp = TempDir::new().unwrap();
        let path = NormalizedPath::new(temp.path().join("pjsip.conf"));
        fs::write(path.to_native(), "[1001]\ntype=aor\nmax_contacts=1\n").unwrap();
        let store = ConfigStore::default().with_retention(1);
        let doc = store
            .load(&path)
            .unwrap()
            .upsert_section("aor", "1001", [("max_contacts", "0")]);

        let outcome = store
            .write_unlocked(
                &path,
                &doc,
                |temp, target| fs::rename(temp, target),
                |path, _| Err(pbx_fs::Error::io(path.to_native(), std::io::Error::other("read-only backup dir"))),
            )
            .unwrap();

        assert!(outcome.changed);
        assert!(outcome.backup.is_some());
        assert_eq!(
            fs::read_to_string(path.to_native()).unwrap(),
            "[1001]\ntype=aor\nmax_contacts=0\n"
        );
    }

    #[test]
    fn decode_reports_the_line_of_the_first_bad_byte() {
        let path = NormalizedPath::new("/etc/asterisk/pjsip.conf");

        match decode(&path, b"[1001]\ntype=endpoint\ncallerid=\"Jos\xE9\"\n".to_vec()) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert_eq!(decode(&path, b"[1001]\n".to_vec()).unwrap(), "[1001]\n");
        assert!(parse(&decode(&path, Vec::new()).unwrap()).unwrap().is_empty());
    }
}
