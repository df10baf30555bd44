//! In-process per-path mutual exclusion
//!
//! The advisory `.lock` file in [`crate::io`] guards a single write against
//! other processes. A read-modify-write cycle needs a wider critical section,
//! which [`PathLocks`] provides inside one process.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;

use crate::NormalizedPath;

/// Registry of one mutex per file, keyed by [`NormalizedPath::lock_key`].
///
/// Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mutex guarding `path`, creating it on first use.
    pub fn handle(&self, path: &NormalizedPath) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.lock_key())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the lock for `path`.
    pub fn with_lock<T>(&self, path: &NormalizedPath, f: impl FnOnce() -> T) -> T {
        let handle = self.handle(path);
        let _guard = lock_ignoring_poison(&handle);
        f()
    }
}

fn lock_ignoring_poison(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    // The guarded data is `()`; a panic elsewhere cannot leave it inconsistent
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn same_path_shares_one_mutex() {
        let locks = PathLocks::new();
        let a = locks.handle(&NormalizedPath::new("/tmp/pjsip.conf"));
        let b = locks.handle(&NormalizedPath::new("/tmp//pjsip.conf"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn critical_sections_do_not_overlap() {
        let locks = PathLocks::new();
        let path = NormalizedPath::new("/tmp/extensions.conf");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let path = path.clone();
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock(&path, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
