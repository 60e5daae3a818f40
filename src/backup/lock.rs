//! Restore mutual exclusion
//!
//! Only one restore may run at a time. The lock is an exclusive advisory
//! lock on `restore.lock` in the vault directory, so it holds across
//! threads (each acquisition opens its own file handle) and across
//! processes sharing the directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{VaultError, VaultResult};

/// Held restore lock; released on drop
#[derive(Debug)]
pub struct RestoreLock {
    file: File,
    path: PathBuf,
}

impl RestoreLock {
    /// Try to take the lock without waiting
    ///
    /// Returns `RestoreInProgress` if another holder exists.
    pub fn acquire(path: &Path) -> VaultResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| VaultError::Io(format!("Failed to open restore lock: {}", e)))?;

        FileExt::try_lock_exclusive(&file).map_err(lock_error)?;

        debug!(path = %path.display(), "restore lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

/// Only contention means another restore holds the lock
fn lock_error(e: io::Error) -> VaultError {
    let contended = fs2::lock_contended_error().raw_os_error();
    if e.raw_os_error().is_some() && e.raw_os_error() == contended {
        VaultError::RestoreInProgress
    } else {
        VaultError::Io(format!("Failed to lock restore lock: {}", e))
    }
}

impl Drop for RestoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, path = %self.path.display(), "failed to release restore lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restore.lock");

        let first = RestoreLock::acquire(&path).unwrap();
        assert!(matches!(
            RestoreLock::acquire(&path),
            Err(VaultError::RestoreInProgress)
        ));

        drop(first);
        assert!(RestoreLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_lock_error_classification() {
        assert!(matches!(
            lock_error(fs2::lock_contended_error()),
            VaultError::RestoreInProgress
        ));
        assert!(matches!(
            lock_error(io::Error::from(io::ErrorKind::PermissionDenied)),
            VaultError::Io(_)
        ));
    }

    #[test]
    fn test_contention_across_threads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restore.lock");
        let _held = RestoreLock::acquire(&path).unwrap();

        let other = path.clone();
        let result = std::thread::spawn(move || RestoreLock::acquire(&other).map(|_| ()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(VaultError::RestoreInProgress)));
    }
}
