//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Tuning knobs for [`write_atomic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobustnessConfig {
    /// How long to keep retrying the advisory lock before giving up
    pub lock_timeout: Duration,
    /// Whether to fsync the temp file before renaming it into place
    pub enable_fsync: bool,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            enable_fsync: true,
        }
    }
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so a reader sees either the old or the new
/// content, never a mix. An advisory lock on `<path>.lock` serializes writers
/// across processes.
pub fn write_atomic(path: &NormalizedPath, content: &[u8], config: RobustnessConfig) -> Result<()> {
    write_atomic_with_commit(path, content, config, |temp, target| fs::rename(temp, target))
}

/// [`write_atomic`] with a caller-supplied commit step.
///
/// `commit` receives the fully written temp file and the target path. If it
/// fails, the temp file is discarded and the target is left untouched.
pub fn write_atomic_with_commit<F>(
    path: &NormalizedPath,
    content: &[u8],
    config: RobustnessConfig,
    commit: F,
) -> Result<()>
where
    F: FnOnce(&Path, &Path) -> std::io::Result<()>,
{
    let native_path = path.to_native();
    let lock = lock_exclusive(path, config.lock_timeout)?;
    let result = write_via_temp(&native_path, content, config.enable_fsync, commit);
    drop(lock);
    result?;

    tracing::debug!(path = %path, bytes = content.len(), "Atomic write committed");
    Ok(())
}

/// Exclusive hold on a file's `<path>.lock` side-car, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Take the advisory lock that [`write_atomic`] uses for `path`.
///
/// Holding it across a read-modify-write keeps other processes from
/// interleaving their own. Inside, write with [`write_unlocked`]:
/// [`write_atomic`] would wait for the lock held here.
pub fn lock_exclusive(path: &NormalizedPath, timeout: Duration) -> Result<FileLock> {
    let native_path = path.to_native();
    if let Some(parent) = native_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
    }
    let file = acquire_lock(&native_path, timeout)?;
    Ok(FileLock { file })
}

/// Atomic temp-then-rename write without the cross-process lock file.
///
/// Only for files whose name is owned by a single writer, such as freshly
/// allocated backup copies, or while holding [`lock_exclusive`].
pub fn write_unlocked(path: &NormalizedPath, content: &[u8], config: RobustnessConfig) -> Result<()> {
    let native_path = path.to_native();
    if let Some(parent) = native_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
    }
    write_via_temp(&native_path, content, config.enable_fsync, |temp, target| {
        fs::rename(temp, target)
    })
}

fn write_via_temp<F>(target: &Path, content: &[u8], fsync: bool, commit: F) -> Result<()>
where
    F: FnOnce(&Path, &Path) -> std::io::Result<()>,
{
    // Same directory keeps the rename on one filesystem
    let temp_path = temp_path_for(target);
    let result = write_temp(&temp_path, content, fsync).and_then(|()| commit(&temp_path, target));

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::write(target, e));
    }
    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Read a file's bytes, or `None` if it does not exist.
pub fn read_optional(path: &NormalizedPath) -> Result<Option<Vec<u8>>> {
    let native_path = path.to_native();
    match fs::read(&native_path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(&native_path, e)),
    }
}

/// Write text content to a file atomically with default settings.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes(), RobustnessConfig::default())
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn temp_path_for(target: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let temp_name = format!(
        ".{}.{}.{}.tmp",
        target
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id(),
        nanos
    );
    target.with_file_name(temp_name)
}

fn acquire_lock(target: &Path, timeout: Duration) -> Result<File> {
    let lock_path = lock_path_for(target);
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::write(&lock_path, e))?;

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(10))
        .with_max_interval(Duration::from_millis(200))
        .with_max_elapsed_time(Some(timeout))
        .build();

    backoff::retry(policy, || lock_file.try_lock_exclusive().map_err(backoff::Error::transient))
        .map_err(|_| Error::LockFailed {
            path: target.to_path_buf(),
        })?;

    Ok(lock_file)
}

fn write_temp(temp_path: &Path, content: &[u8], fsync: bool) -> std::io::Result<()> {
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)?;
    temp_file.write_all(content)?;
    if fsync {
        temp_file.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_stays_in_target_directory() {
        let target = Path::new("/etc/asterisk/pjsip.conf");
        let temp = temp_path_for(target);
        assert_eq!(temp.parent(), target.parent());
        assert!(temp.file_name().unwrap().to_string_lossy().starts_with(".pjsip.conf."));
    }

    #[test]
    fn lock_path_is_side_car() {
        let lock = lock_path_for(Path::new("/etc/asterisk/pjsip.conf"));
        assert_eq!(lock, PathBuf::from("/etc/asterisk/pjsip.conf.lock"));
    }
}
