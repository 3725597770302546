//! The process-wide table of paths currently held open for download.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A process-wide, concurrency-safe refcounted set of canonical paths currently being streamed
/// to some client. Readers may coexist: two concurrent downloads of the same path each hold
/// their own count, and the path stays locked until the last one releases it. `DELETE` consults
/// this table and refuses to remove a path with a nonzero count.
#[derive(Clone, Default)]
pub struct FileLocks(Arc<DashMap<PathBuf, usize>>);

impl FileLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        FileLocks(Arc::new(DashMap::new()))
    }

    /// Marks `path` as locked, returning a guard that releases one reference on drop. A path
    /// locked by two concurrent readers stays locked until both guards are dropped.
    pub fn lock(&self, path: &Path) -> FileLockGuard {
        *self.0.entry(path.to_path_buf()).or_insert(0) += 1;
        FileLockGuard {
            locks: self.clone(),
            path: path.to_path_buf(),
        }
    }

    /// Whether `path` is currently locked by at least one in-progress download.
    pub fn is_locked(&self, path: &Path) -> bool {
        self.0.get(path).is_some_and(|count| *count > 0)
    }
}

/// Releases one reference on its path from the owning [`FileLocks`] table when dropped, so a
/// session that ends abnormally (panic, error, disconnect) can never leak a lock. The entry is
/// removed from the table entirely once its count reaches zero.
pub struct FileLockGuard {
    locks: FileLocks,
    path: PathBuf,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Some(mut count) = self.locks.0.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                drop(count);
                self.locks.0.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_and_release_round_trips() {
        let locks = FileLocks::new();
        let path = PathBuf::from("/srv/alice/big.bin");
        assert!(!locks.is_locked(&path));
        let guard = locks.lock(&path);
        assert!(locks.is_locked(&path));
        drop(guard);
        assert!(!locks.is_locked(&path));
    }

    #[test]
    fn guard_release_survives_a_clone_of_the_table() {
        let locks = FileLocks::new();
        let path = PathBuf::from("/srv/alice/big.bin");
        let other_handle = locks.clone();
        let guard = locks.lock(&path);
        assert!(other_handle.is_locked(&path));
        drop(guard);
        assert!(!other_handle.is_locked(&path));
    }

    #[test]
    fn concurrent_readers_keep_a_path_locked_until_the_last_releases_it() {
        let locks = FileLocks::new();
        let path = PathBuf::from("/srv/alice/big.bin");
        let first = locks.lock(&path);
        let second = locks.lock(&path);
        assert!(locks.is_locked(&path));

        drop(first);
        assert!(locks.is_locked(&path), "a second reader should keep the path locked");

        drop(second);
        assert!(!locks.is_locked(&path), "the path should unlock once every reader is gone");
    }
}
