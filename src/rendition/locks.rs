//! Build locks for the rendition cache.

use clap::ValueEnum;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// How rendition builds are serialised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BuildLockScope {
    /// One build at a time across the whole process.
    #[default]
    Global,
    /// One build at a time per rendition path.
    PerKey,
}

/// Hands out the lock guarding a rendition build.
///
/// Per-key locks live in the map only while someone holds or waits on them.
#[derive(Debug)]
pub struct BuildLocks {
    scope: BuildLockScope,
    global: Arc<Mutex<()>>,
    per_key: StdMutex<HashMap<PathBuf, Weak<Mutex<()>>>>,
}

impl BuildLocks {
    pub fn new(scope: BuildLockScope) -> Self {
        Self {
            scope,
            global: Arc::new(Mutex::new(())),
            per_key: StdMutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> BuildLockScope {
        self.scope
    }

    /// Wait for the lock covering `key`.
    pub async fn acquire(&self, key: &Path) -> OwnedMutexGuard<()> {
        let lock = match self.scope {
            BuildLockScope::Global => self.global.clone(),
            BuildLockScope::PerKey => self.key_lock(key),
        };
        lock.lock_owned().await
    }

    fn key_lock(&self, key: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.per_key.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);
        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(key.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    /// Number of per-key locks currently in use.
    pub fn active_keys(&self) -> usize {
        self.per_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}
