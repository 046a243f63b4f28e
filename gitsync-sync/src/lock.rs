//! Advisory file lock shared by every process that touches the history file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::HistoryError;

/// Exclusive advisory lock held for the guard's lifetime.
///
/// The lock file itself is left in place on drop; removing it would let a
/// waiter lock an unlinked inode while a newcomer locks a fresh one.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the exclusive lock on `path` is held, creating the file
    /// and its parent directory if needed.
    pub fn acquire(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| crate::error::io_err(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| crate::error::io_err(path, e))?;
        file.lock_exclusive().map_err(|source| HistoryError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Best-effort unlock; the OS releases it on close anyway.
        let _ = self.file.unlock();
    }
}
