//! Content-addressed, deduplicated configuration backups
//!
//! Backups are plain copies named `<fileName>.<tag>.<YYYYmmddHHMMSS>` and
//! live either next to the source file or in a dedicated backup directory.
//! Two backups taken within the same second get a `-N` counter suffix.
//!
//! A new copy is only made when the source differs from its newest backup,
//! so repeated no-op runs collapse into a single entry.

use std::fs;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::checksum::compute_bytes_checksum;
use crate::io::{self, RobustnessConfig};
use crate::{Error, NormalizedPath, PathLocks, Result, validate_path_identifier};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
/// Tag used in backup names unless configured otherwise
pub const DEFAULT_TAG: &str = "bak";

/// Suffix following the source file name: `.<tag>.<timestamp>[-<sequence>]`
static BACKUP_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.[A-Za-z0-9_-]+\.(\d{14})(?:-(\d+))?$").expect("Invalid backup suffix regex")
});

/// A single backup copy of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Backup identifier (the backup's file name)
    pub id: String,
    /// File the backup was taken from
    pub source_path: NormalizedPath,
    /// Location of the backup copy
    pub backup_path: NormalizedPath,
    /// `sha256:<hex>` of the backed-up bytes
    pub content_hash: String,
    /// Creation time, second resolution
    pub created_at: DateTime<Utc>,
    /// Disambiguates backups created within the same second
    pub sequence: u32,
}

impl BackupEntry {
    fn order_key(&self) -> (DateTime<Utc>, u32, &str) {
        (self.created_at, self.sequence, self.id.as_str())
    }
}

/// Manages deduplicated backups of configuration files.
///
/// Cloning shares the internal per-source locks.
#[derive(Debug, Clone)]
pub struct BackupStore {
    /// Dedicated backup directory; `None` keeps backups beside the source
    backup_dir: Option<NormalizedPath>,
    /// Domain tag embedded in new backup names
    tag: String,
    robustness: RobustnessConfig,
    locks: PathLocks,
}

impl Default for BackupStore {
    fn default() -> Self {
        Self {
            backup_dir: None,
            tag: DEFAULT_TAG.to_string(),
            robustness: RobustnessConfig::default(),
            locks: PathLocks::new(),
        }
    }
}

impl BackupStore {
    /// Create a store that keeps backups next to their source files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep all backups in `dir` instead of beside the source.
    pub fn with_backup_dir(mut self, dir: NormalizedPath) -> Self {
        self.backup_dir = Some(dir);
        self
    }

    /// Use `tag` as the domain part of new backup names.
    ///
    /// # Errors
    ///
    /// Tags are restricted to ASCII letters, digits, `_` and `-`.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.is_empty()
            || !tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::InvalidIdentifier(format!(
                "Backup tag must be alphanumeric, '_' or '-': {:?}",
                tag
            )));
        }
        self.tag = tag;
        Ok(self)
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.robustness = robustness;
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Directory holding the backups of `source`.
    pub fn dir_for(&self, source: &NormalizedPath) -> NormalizedPath {
        self.backup_dir.clone().unwrap_or_else(|| source.dir())
    }

    /// Back up `source` unless its content equals the newest backup.
    ///
    /// Returns `None` when the source does not exist, otherwise the entry
    /// representing the current content (new or pre-existing).
    pub fn backup(&self, source: &NormalizedPath) -> Result<Option<BackupEntry>> {
        self.locks.with_lock(source, || self.backup_unlocked(source))
    }

    /// All backups of `source`, newest first.
    pub fn list(&self, source: &NormalizedPath) -> Result<Vec<BackupEntry>> {
        self.locks.with_lock(source, || self.list_unlocked(source))
    }

    /// The newest backup of `source`, if any.
    pub fn latest(&self, source: &NormalizedPath) -> Result<Option<BackupEntry>> {
        Ok(self.list(source)?.into_iter().next())
    }

    /// Copy a backup's content onto `target`.
    ///
    /// The current content of `target` is backed up first, so a restore can
    /// itself be undone.
    ///
    /// # Errors
    ///
    /// [`Error::BackupNotFound`] if `backup_id` is not a backup of `target`.
    pub fn restore(&self, backup_id: &str, target: &NormalizedPath) -> Result<BackupEntry> {
        validate_path_identifier(backup_id, "Backup id").map_err(Error::InvalidIdentifier)?;

        self.locks.with_lock(target, || {
            let entry = self
                .list_unlocked(target)?
                .into_iter()
                .find(|e| e.id == backup_id)
                .ok_or_else(|| Error::BackupNotFound {
                    id: backup_id.to_string(),
                })?;

            let native = entry.backup_path.to_native();
            let bytes = fs::read(&native).map_err(|e| Error::io(&native, e))?;

            self.backup_unlocked(target)?;
            io::write_atomic(target, &bytes, self.robustness)?;

            tracing::info!(backup = %entry.id, target = %target, "Restored backup");
            Ok(entry)
        })
    }

    /// Delete all but the `keep` newest backups of `source`.
    ///
    /// Returns the removed entries. The source file itself is never touched.
    pub fn cleanup(&self, source: &NormalizedPath, keep: usize) -> Result<Vec<BackupEntry>> {
        self.locks.with_lock(source, || {
            let stale: Vec<BackupEntry> = self.list_unlocked(source)?.into_iter().skip(keep).collect();

            for entry in &stale {
                let native = entry.backup_path.to_native();
                match fs::remove_file(&native) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io(&native, e)),
                }
            }

            if !stale.is_empty() {
                tracing::info!(source = %source, removed = stale.len(), keep, "Pruned backups");
            }
            Ok(stale)
        })
    }

    fn backup_unlocked(&self, source: &NormalizedPath) -> Result<Option<BackupEntry>> {
        let Some(bytes) = io::read_optional(source)? else {
            tracing::debug!(source = %source, "Nothing to back up, source does not exist");
            return Ok(None);
        };
        let content_hash = compute_bytes_checksum(&bytes);

        let existing = self.list_unlocked(source)?;
        if let Some(newest) = existing.first()
            && newest.content_hash == content_hash
        {
            tracing::debug!(source = %source, backup = %newest.id, "Content unchanged, reusing backup");
            return Ok(Some(newest.clone()));
        }

        let (created_at, sequence) = next_slot(&existing, Utc::now());
        let file_name = source_file_name(source)?;
        let dir = self.dir_for(source);

        let mut sequence = sequence;
        let (id, backup_path) = loop {
            let id = backup_name(file_name, &self.tag, created_at, sequence);
            let path = dir.join(&id);
            if !path.exists() {
                break (id, path);
            }
            sequence += 1;
        };

        io::write_unlocked(&backup_path, &bytes, self.robustness)?;
        tracing::info!(source = %source, backup = %id, hash = %content_hash, "Created backup");

        Ok(Some(BackupEntry {
            id,
            source_path: source.clone(),
            backup_path,
            content_hash,
            created_at,
            sequence,
        }))
    }

    fn list_unlocked(&self, source: &NormalizedPath) -> Result<Vec<BackupEntry>> {
        let dir = self.dir_for(source);
        let native_dir = dir.to_native();
        if !native_dir.is_dir() {
            return Ok(Vec::new());
        }

        let file_name = source_file_name(source)?;
        let read_dir = fs::read_dir(&native_dir).map_err(|e| Error::io(&native_dir, e))?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| Error::io(&native_dir, e))?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let Some((created_at, sequence)) = parse_backup_name(file_name, &name) else {
                continue;
            };

            let backup_path = dir.join(&name);
            let native = backup_path.to_native();
            if !native.is_file() {
                continue;
            }
            let bytes = fs::read(&native).map_err(|e| Error::io(&native, e))?;

            entries.push(BackupEntry {
                id: name,
                source_path: source.clone(),
                backup_path,
                content_hash: compute_bytes_checksum(&bytes),
                created_at,
                sequence,
            });
        }

        entries.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
        Ok(entries)
    }
}

fn source_file_name(source: &NormalizedPath) -> Result<&str> {
    source
        .file_name()
        .ok_or_else(|| Error::InvalidIdentifier(format!("Not a file path: {}", source)))
}

/// Parse `name` as a backup of `file_name`, returning its time and sequence.
fn parse_backup_name(file_name: &str, name: &str) -> Option<(DateTime<Utc>, u32)> {
    let suffix = name.strip_prefix(file_name)?;
    let caps = BACKUP_SUFFIX.captures(suffix)?;
    let stamp = caps.get(1)?.as_str();
    let created_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    let sequence = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    Some((created_at, sequence))
}

fn backup_name(file_name: &str, tag: &str, created_at: DateTime<Utc>, sequence: u32) -> String {
    let stamp = created_at.format(TIMESTAMP_FORMAT);
    if sequence == 0 {
        format!("{}.{}.{}", file_name, tag, stamp)
    } else {
        format!("{}.{}.{}-{}", file_name, tag, stamp, sequence)
    }
}

/// Pick the timestamp and counter for a new backup.
///
/// New backups always sort after existing ones, even if the clock reads an
/// earlier second than the newest backup.
fn next_slot(existing: &[BackupEntry], now: DateTime<Utc>) -> (DateTime<Utc>, u32) {
    let now = truncate_to_second(now);
    match existing.first() {
        Some(newest) if newest.created_at >= now => {
            let sequence = existing
                .iter()
                .filter(|e| e.created_at == newest.created_at)
                .map(|e| e.sequence + 1)
                .max()
                .unwrap_or(1);
            (newest.created_at, sequence)
        }
        _ => (now, 0),
    }
}

fn truncate_to_second(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}
