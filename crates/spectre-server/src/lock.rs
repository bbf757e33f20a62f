//! Exclusive data-directory lock.
//!
//! The segment files are owned by exactly one process. Startup takes an
//! advisory exclusive lock on `<data_dir>/lock` and refuses to start when
//! another instance holds it (exit code 2).

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// Lock acquisition failures.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("lock at {path} is held by another instance")]
    Held { path: PathBuf },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A held lock. Released on drop (and by the OS on process death).
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

/// Acquires the exclusive lock under `data_dir`, creating the directory if
/// needed.
pub fn acquire(data_dir: &Path) -> Result<DirLock, LockError> {
    fs::create_dir_all(data_dir)?;
    let path = data_dir.join("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(DirLock { file, path }),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::Held { path }),
        Err(e) => Err(LockError::Io(e)),
    }
}
