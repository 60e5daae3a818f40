//! Restore pipeline
//!
//! Decode → decrypt → verify digest → verify authentication code → extract
//! → validate metadata → replace live state → clean up. Nothing in live
//! state is touched until every check has passed.
//!
//! Replacement order: the data store is imported first (it is atomic on its
//! own), then the file root is swapped. If the swap fails the previous data
//! store contents are re-imported and the caller gets `PartialRestore`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEntry, AuditLogger};
use crate::config::BackupConfig;
use crate::crypto::{self, integrity::digest_prefix, SecureString};
use crate::error::{FailureKind, VaultError, VaultResult};
use crate::storage::{DataStore, FileRoot};

use super::archive::{extract_archive, ArchiveMetadata, ARCHIVE_FORMAT_VERSION};
use super::artifact;
use super::lock::RestoreLock;
use super::manager::{DEFAULT_REQUESTER, DIGEST_PREFIX_LEN};
use super::worker::CancelToken;

/// Stages of the restore pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStage {
    Decoding,
    Decrypting,
    VerifyingDigest,
    VerifyingAuthenticity,
    Extracting,
    ValidatingMetadata,
    ReplacingLiveState,
    CleaningUp,
    Done,
}

impl RestoreStage {
    /// The only stage allowed to follow this one
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Decoding => Some(Self::Decrypting),
            Self::Decrypting => Some(Self::VerifyingDigest),
            Self::VerifyingDigest => Some(Self::VerifyingAuthenticity),
            Self::VerifyingAuthenticity => Some(Self::Extracting),
            Self::Extracting => Some(Self::ValidatingMetadata),
            Self::ValidatingMetadata => Some(Self::ReplacingLiveState),
            Self::ReplacingLiveState => Some(Self::CleaningUp),
            Self::CleaningUp => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Whether a cancel request may still stop the pipeline on entry
    fn honours_cancel(self) -> bool {
        matches!(
            self,
            Self::Decoding
                | Self::Decrypting
                | Self::VerifyingDigest
                | Self::VerifyingAuthenticity
                | Self::Extracting
                | Self::ValidatingMetadata
                | Self::ReplacingLiveState
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decoding => "decoding",
            Self::Decrypting => "decrypting",
            Self::VerifyingDigest => "verifying_digest",
            Self::VerifyingAuthenticity => "verifying_authenticity",
            Self::Extracting => "extracting",
            Self::ValidatingMetadata => "validating_metadata",
            Self::ReplacingLiveState => "replacing_live_state",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one restore
#[derive(Debug)]
pub struct RestoreRequest {
    /// Encoded artifact bytes
    pub artifact: Vec<u8>,
    pub password: SecureString,
    pub requested_by: String,
}

impl RestoreRequest {
    pub fn new(artifact: Vec<u8>, password: impl Into<SecureString>) -> Self {
        Self {
            artifact,
            password: password.into(),
            requested_by: DEFAULT_REQUESTER.to_string(),
        }
    }

    pub fn requested_by(mut self, who: impl Into<String>) -> Self {
        self.requested_by = who.into();
        self
    }
}

/// Details of a completed restore
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// The application must restart to pick up the new state
    pub restart_required: bool,
    /// Verified in-archive metadata
    pub metadata: ArchiveMetadata,
    pub restored_files: usize,
    pub data_export_size: u64,
    /// Stages passed through, in order
    pub stages: Vec<RestoreStage>,
}

impl RestoreReport {
    /// Get a summary of the restore
    pub fn summary(&self) -> String {
        format!(
            "Restored {} ({} files, {} bytes of records) from a backup taken {}",
            self.metadata.institution_name,
            self.restored_files,
            self.data_export_size,
            self.metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Caller-facing result of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Success { restart_required: bool },
    Failed { kind: FailureKind, message: String },
}

impl RestoreOutcome {
    pub fn from_result(result: &VaultResult<RestoreReport>) -> Self {
        match result {
            Ok(report) => Self::Success {
                restart_required: report.restart_required,
            },
            Err(e) => Self::Failed {
                kind: e.kind(),
                message: e.user_message(),
            },
        }
    }
}

struct Progress<'a> {
    current: Option<RestoreStage>,
    trail: Vec<RestoreStage>,
    token: &'a CancelToken,
}

impl<'a> Progress<'a> {
    fn new(token: &'a CancelToken) -> Self {
        Self {
            current: None,
            trail: Vec::new(),
            token,
        }
    }

    fn advance(&mut self) -> VaultResult<RestoreStage> {
        let next = match self.current {
            None => RestoreStage::Decoding,
            Some(stage) => stage.next().unwrap_or(RestoreStage::Done),
        };
        if next.honours_cancel() && self.token.is_cancelled() {
            return Err(VaultError::Cancelled {
                stage: next.to_string(),
            });
        }
        self.current = Some(next);
        self.trail.push(next);
        debug!(stage = %next, "restore stage");
        Ok(next)
    }
}

/// Restores live state from encrypted backup artifacts
pub struct RestoreManager {
    config: Arc<BackupConfig>,
    data_store: Arc<dyn DataStore>,
    file_root: Arc<dyn FileRoot>,
    audit: AuditLogger,
}

impl RestoreManager {
    /// Create a new RestoreManager
    pub fn new(
        config: Arc<BackupConfig>,
        data_store: Arc<dyn DataStore>,
        file_root: Arc<dyn FileRoot>,
    ) -> Self {
        let audit = AuditLogger::new(config.paths().audit_log());
        Self {
            config,
            data_store,
            file_root,
            audit,
        }
    }

    /// Restore live state from an encoded artifact
    pub fn restore_backup(&self, artifact: &[u8], password: &str) -> VaultResult<RestoreReport> {
        let request = RestoreRequest::new(artifact.to_vec(), password);
        self.restore_with_cancel(&request, &CancelToken::new())
    }

    /// Restore, stopping between stages if `token` is cancelled
    ///
    /// Cancellation is ignored once live state starts being replaced.
    pub fn restore_with_cancel(
        &self,
        request: &RestoreRequest,
        token: &CancelToken,
    ) -> VaultResult<RestoreReport> {
        let result = match RestoreLock::acquire(&self.config.paths().restore_lock()) {
            Ok(lock) => {
                let mut progress = Progress::new(token);
                let result = self.run(request, &mut progress);
                drop(lock);
                if let Err(e) = &result {
                    self.log_failure(e, progress.current);
                }
                result
            }
            Err(e) => {
                warn!(error = %e, "restore refused");
                Err(e)
            }
        };

        match &result {
            Ok(report) => {
                info!(
                    requested_by = %request.requested_by,
                    files = report.restored_files,
                    "restore completed; restart required"
                );
            }
            Err(e) => {
                self.audit.record(&AuditEntry::restore_failed(
                    request.requested_by.as_str(),
                    e.kind(),
                    e.to_string(),
                ));
            }
        }

        result
    }

    fn log_failure(&self, err: &VaultError, stage: Option<RestoreStage>) {
        let stage = stage.map(|s| s.as_str()).unwrap_or("locking");
        match err {
            VaultError::PartialRestore {
                reason,
                data_rolled_back,
            } => {
                error!(
                    stage,
                    reason = %reason,
                    data_rolled_back,
                    "restore left live state partially replaced; operator intervention required"
                );
            }
            VaultError::CorruptArchive(detail) => {
                warn!(stage, detail = %detail, "backup appears corrupted");
            }
            VaultError::UnauthenticatedArchive(detail) => {
                error!(
                    stage,
                    detail = %detail,
                    "backup failed authentication: possible tampering or foreign signing secret"
                );
            }
            other => {
                warn!(stage, kind = %other.kind(), error = %other, "restore failed");
            }
        }
    }

    fn run(&self, request: &RestoreRequest, progress: &mut Progress<'_>) -> VaultResult<RestoreReport> {
        progress.advance()?; // decoding
        let envelope = artifact::decode(&request.artifact)?;
        let sealed = envelope.sealed_bytes()?;

        progress.advance()?; // decrypting
        let archive = crypto::decrypt(&sealed, request.password.as_str())?;

        progress.advance()?; // verifying digest
        if !crypto::verify_digest(&archive, &envelope.content_digest) {
            return Err(VaultError::CorruptArchive(
                "archive digest does not match the recorded digest".into(),
            ));
        }

        progress.advance()?; // verifying authenticity
        if !crypto::verify_authentication(
            &archive,
            self.config.auth_secret(),
            &envelope.authentication_code,
        ) {
            return Err(VaultError::UnauthenticatedArchive(
                "authentication code does not match".into(),
            ));
        }
        let prefix = digest_prefix(&envelope.content_digest, DIGEST_PREFIX_LEN).to_string();
        debug!(digest = %prefix, size = archive.len(), "archive verified");

        progress.advance()?; // extracting
        let temp_root = self.config.paths().temp_dir();
        std::fs::create_dir_all(&temp_root)?;
        let work_dir = tempfile::Builder::new()
            .prefix("restore-")
            .tempdir_in(&temp_root)
            .map_err(|e| VaultError::Io(format!("Failed to create work directory: {}", e)))?;
        let extracted = extract_archive(&archive, work_dir.path())?;

        progress.advance()?; // validating metadata
        let metadata = &extracted.metadata;
        if metadata.format_version != ARCHIVE_FORMAT_VERSION {
            return Err(VaultError::MalformedArchive(format!(
                "unsupported archive layout: {}",
                metadata.format_version
            )));
        }
        if metadata.file_count != extracted.file_count {
            return Err(VaultError::MalformedArchive(format!(
                "metadata lists {} files but archive holds {}",
                metadata.file_count, extracted.file_count
            )));
        }
        if extracted.data_export.is_empty() {
            return Err(VaultError::MalformedArchive("data export is empty".into()));
        }
        if metadata.export_size != extracted.data_export.len() as u64 {
            return Err(VaultError::MalformedArchive(format!(
                "metadata records a {} byte export but archive holds {}",
                metadata.export_size,
                extracted.data_export.len()
            )));
        }

        progress.advance()?; // replacing live state
        self.replace_live_state(&extracted.data_export, &extracted.files_dir)?;

        progress.advance()?; // cleaning up
        let report = RestoreReport {
            restart_required: true,
            metadata: extracted.metadata.clone(),
            restored_files: extracted.file_count,
            data_export_size: extracted.data_export.len() as u64,
            stages: Vec::new(),
        };
        if let Err(e) = work_dir.close() {
            warn!(error = %e, "failed to remove restore work directory");
        }

        self.audit.record(&AuditEntry::restore_completed(
            request.requested_by.as_str(),
            archive.len() as u64,
            prefix,
            report.restored_files,
        ));

        progress.advance()?; // done
        Ok(RestoreReport {
            stages: progress.trail.clone(),
            ..report
        })
    }

    fn replace_live_state(&self, export: &[u8], files_dir: &std::path::Path) -> VaultResult<()> {
        let previous = self.data_store.export_all()?;

        self.data_store.import_all(export)?;
        debug!(bytes = export.len(), "data store replaced");

        if let Err(e) = self.file_root.replace_with(files_dir) {
            let data_rolled_back = match self.data_store.import_all(&previous) {
                Ok(()) => true,
                Err(rollback_err) => {
                    error!(error = %rollback_err, "failed to roll back data store");
                    false
                }
            };
            return Err(VaultError::PartialRestore {
                reason: e.to_string(),
                data_rolled_back,
            });
        }
        debug!(root = %self.file_root.root().display(), "file root replaced");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_linear() {
        let mut stage = RestoreStage::Decoding;
        let mut trail = vec![stage];
        while let Some(next) = stage.next() {
            trail.push(next);
            stage = next;
        }
        assert_eq!(
            trail,
            vec![
                RestoreStage::Decoding,
                RestoreStage::Decrypting,
                RestoreStage::VerifyingDigest,
                RestoreStage::VerifyingAuthenticity,
                RestoreStage::Extracting,
                RestoreStage::ValidatingMetadata,
                RestoreStage::ReplacingLiveState,
                RestoreStage::CleaningUp,
                RestoreStage::Done,
            ]
        );
    }

    #[test]
    fn test_cancel_not_honoured_after_replace() {
        assert!(RestoreStage::ReplacingLiveState.honours_cancel());
        assert!(!RestoreStage::CleaningUp.honours_cancel());
        assert!(!RestoreStage::Done.honours_cancel());
    }

    #[test]
    fn test_outcome_from_error() {
        let result: VaultResult<RestoreReport> = Err(VaultError::WrongPassword);
        match RestoreOutcome::from_result(&result) {
            RestoreOutcome::Failed { kind, message } => {
                assert_eq!(kind, FailureKind::WrongPassword);
                assert_eq!(message, VaultError::WrongPassword.user_message());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = RestoreOutcome::Success {
            restart_required: true,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"status":"success","restart_required":true}"#);
    }
}
