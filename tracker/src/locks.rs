//! Single-flight guards keyed by working-copy path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-working-copy locks shared by every reconciler in the process.
///
/// Paths are canonicalized so two spellings of the same directory share a lock.
#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

/// Exclusive write access to one working copy; released on drop.
#[derive(Debug)]
pub struct CycleGuard {
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl CycleGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn lock_for(&self, key: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Take the lock for `path` if nobody holds it.
    pub fn try_acquire(&self, path: &Path) -> Option<CycleGuard> {
        let key = Self::key(path);
        let guard = self.lock_for(&key).try_lock_owned().ok()?;
        Some(CycleGuard {
            path: key,
            _guard: guard,
        })
    }
}
