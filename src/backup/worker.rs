//! Background execution for backup and restore
//!
//! Each invocation runs on its own named thread so a request handler can
//! return immediately and poll or join later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::{VaultError, VaultResult};

use super::manager::{BackupManager, BackupOutcome, BackupRequest};
use super::restore::{RestoreManager, RestoreReport, RestoreRequest};

/// Shared cancellation flag
///
/// Clones observe the same flag. Pipelines check it between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Run a backup on a dedicated thread
pub fn spawn_backup(
    manager: Arc<BackupManager>,
    request: BackupRequest,
    token: CancelToken,
) -> VaultResult<JoinHandle<VaultResult<BackupOutcome>>> {
    debug!("spawning backup worker");
    thread::Builder::new()
        .name("rollcall-backup".into())
        .spawn(move || manager.create_backup_with_cancel(request, &token))
        .map_err(|e| VaultError::Io(format!("Failed to start backup worker: {}", e)))
}

/// Run a restore on a dedicated thread
pub fn spawn_restore(
    manager: Arc<RestoreManager>,
    request: RestoreRequest,
    token: CancelToken,
) -> VaultResult<JoinHandle<VaultResult<RestoreReport>>> {
    debug!("spawning restore worker");
    thread::Builder::new()
        .name("rollcall-restore".into())
        .spawn(move || manager.restore_with_cancel(&request, &token))
        .map_err(|e| VaultError::Io(format!("Failed to start restore worker: {}", e)))
}
