use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tokio::sync::RwLock;

/// Registry shared by every manager in the process
pub(crate) static PATH_LOCKS: LazyLock<PathLocks> = LazyLock::new(PathLocks::default);

/// One reader/writer lock per index directory.
///
/// Paths are made absolute and normalized lexically, so `./idx`, `sub/../idx`
/// and `$PWD/idx` share a lock even before the directory exists. Locks nobody
/// holds are pruned.
#[derive(Debug, Default)]
pub(crate) struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl PathLocks {
    pub(crate) fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let key = lock_key(path);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key).or_default())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub(crate) fn lock_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut key = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            // `..` at the root stays at the root
            Component::ParentDir => {
                key.pop();
            }
            other => key.push(other),
        }
    }
    key
}
