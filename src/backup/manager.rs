//! Backup pipeline
//!
//! Export → archive → digest → authenticate → encrypt → encode. Every
//! intermediate file lives in a per-invocation work directory that is
//! removed on every exit path.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLogger};
use crate::config::BackupConfig;
use crate::crypto::{self, integrity::digest_prefix, SecureString};
use crate::error::{VaultError, VaultResult};
use crate::storage::{write_bytes_atomic, DataStore, FileRoot};

use super::archive::{build_archive, ArchiveMetadata};
use super::artifact::{self, BackupArtifact, ContextSummary};
use super::worker::CancelToken;

/// Length of the digest prefix written to logs and the audit trail
pub const DIGEST_PREFIX_LEN: usize = 12;

/// Default requester recorded when none is given
pub const DEFAULT_REQUESTER: &str = "system";

/// Stages of the backup pipeline, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStage {
    Validating,
    Exporting,
    Archiving,
    Digesting,
    Authenticating,
    Encrypting,
    Encoding,
    Done,
}

impl BackupStage {
    /// The stage that follows this one
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Validating => Some(Self::Exporting),
            Self::Exporting => Some(Self::Archiving),
            Self::Archiving => Some(Self::Digesting),
            Self::Digesting => Some(Self::Authenticating),
            Self::Authenticating => Some(Self::Encrypting),
            Self::Encrypting => Some(Self::Encoding),
            Self::Encoding => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Exporting => "exporting",
            Self::Archiving => "archiving",
            Self::Digesting => "digesting",
            Self::Authenticating => "authenticating",
            Self::Encrypting => "encrypting",
            Self::Encoding => "encoding",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one backup
#[derive(Debug)]
pub struct BackupRequest {
    pub password: SecureString,
    /// Second entry of the password, checked when present
    pub confirmation: Option<SecureString>,
    pub requested_by: String,
    /// Extra key/value pairs stored in the archive metadata
    pub extra: BTreeMap<String, String>,
}

impl BackupRequest {
    pub fn new(password: impl Into<SecureString>) -> Self {
        Self {
            password: password.into(),
            confirmation: None,
            requested_by: DEFAULT_REQUESTER.to_string(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_confirmation(mut self, confirmation: impl Into<SecureString>) -> Self {
        self.confirmation = Some(confirmation.into());
        self
    }

    pub fn requested_by(mut self, who: impl Into<String>) -> Self {
        self.requested_by = who.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Result of a successful backup
#[derive(Debug)]
pub struct BackupOutcome {
    pub artifact: BackupArtifact,
    /// Encoded artifact, ready to be written or sent
    pub encoded: Vec<u8>,
    /// Stages passed through, in order
    pub stages: Vec<BackupStage>,
}

/// Tracks the current stage and honours cancellation between stages
struct Progress<'a> {
    current: Option<BackupStage>,
    trail: Vec<BackupStage>,
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

    fn advance(&mut self) -> VaultResult<BackupStage> {
        let next = match self.current {
            None => BackupStage::Validating,
            Some(stage) => stage.next().unwrap_or(BackupStage::Done),
        };
        if next != BackupStage::Done && self.token.is_cancelled() {
            return Err(VaultError::Cancelled {
                stage: next.to_string(),
            });
        }
        self.current = Some(next);
        self.trail.push(next);
        debug!(stage = %next, "backup stage");
        Ok(next)
    }
}

/// Creates encrypted backup artifacts
pub struct BackupManager {
    config: Arc<BackupConfig>,
    data_store: Arc<dyn DataStore>,
    file_root: Arc<dyn FileRoot>,
    audit: AuditLogger,
}

impl BackupManager {
    /// Create a new BackupManager
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

    /// Create a backup of all live state
    pub fn create_backup(&self, request: BackupRequest) -> VaultResult<BackupOutcome> {
        self.create_backup_with_cancel(request, &CancelToken::new())
    }

    /// Create a backup, stopping between stages if `token` is cancelled
    pub fn create_backup_with_cancel(
        &self,
        request: BackupRequest,
        token: &CancelToken,
    ) -> VaultResult<BackupOutcome> {
        let mut progress = Progress::new(token);
        let result = self.run(&request, &mut progress);

        match &result {
            Ok(outcome) => {
                let prefix = digest_prefix(&outcome.artifact.content_digest, DIGEST_PREFIX_LEN);
                info!(
                    requested_by = %request.requested_by,
                    size = outcome.artifact.declared_size,
                    digest = prefix,
                    "backup created"
                );
                self.audit.record(&AuditEntry::backup_created(
                    request.requested_by.as_str(),
                    outcome.artifact.declared_size,
                    prefix,
                ));
            }
            Err(e) => {
                let stage = progress
                    .current
                    .map(|s| s.as_str())
                    .unwrap_or("validating");
                warn!(stage, kind = %e.kind(), error = %e, "backup failed");
            }
        }

        result
    }

    fn run(&self, request: &BackupRequest, progress: &mut Progress<'_>) -> VaultResult<BackupOutcome> {
        let settings = self.config.settings();

        progress.advance()?; // validating
        if request.password.char_len() < settings.min_password_length {
            return Err(VaultError::WeakPassword {
                min_length: settings.min_password_length,
            });
        }
        if let Some(confirmation) = &request.confirmation {
            if confirmation != &request.password {
                return Err(VaultError::PasswordMismatch);
            }
        }

        let temp_root = self.config.paths().temp_dir();
        std::fs::create_dir_all(&temp_root)?;
        let work_dir = tempfile::Builder::new()
            .prefix("backup-")
            .tempdir_in(&temp_root)
            .map_err(|e| VaultError::Io(format!("Failed to create work directory: {}", e)))?;

        progress.advance()?; // exporting
        let export = self.data_store.export_all().map_err(|e| match e {
            VaultError::MissingDataExport(_) => e,
            other => VaultError::MissingDataExport(other.to_string()),
        })?;
        debug!(bytes = export.len(), "data exported");

        progress.advance()?; // archiving
        let metadata =
            ArchiveMetadata::new(settings.institution_name.clone()).with_extra(request.extra.clone());
        let archive = build_archive(
            &export,
            self.file_root.as_ref(),
            metadata,
            settings.compression_level,
            work_dir.path(),
        )?;

        progress.advance()?; // digesting
        let content_digest = crypto::digest(&archive.bytes);

        progress.advance()?; // authenticating
        let authentication_code = crypto::authenticate(&archive.bytes, self.config.auth_secret())?;

        progress.advance()?; // encrypting
        let sealed = crypto::encrypt(
            &archive.bytes,
            request.password.as_str(),
            &settings.key_derivation,
        )?;

        progress.advance()?; // encoding
        let artifact = BackupArtifact::new(
            &sealed,
            content_digest,
            authentication_code,
            archive.bytes.len() as u64,
            Some(ContextSummary {
                institution_name: archive.metadata.institution_name.clone(),
                file_count: archive.metadata.file_count,
            }),
        );
        let encoded = artifact::encode(&artifact)?;

        if let Err(e) = work_dir.close() {
            warn!(error = %e, "failed to remove backup work directory");
        }

        progress.advance()?; // done
        Ok(BackupOutcome {
            artifact,
            encoded,
            stages: progress.trail.clone(),
        })
    }

    /// Write an encoded artifact to `path` atomically
    pub fn write_artifact(outcome: &BackupOutcome, path: &Path) -> VaultResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        write_bytes_atomic(path, &outcome.encoded)
    }
}
