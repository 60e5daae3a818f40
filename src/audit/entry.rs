//! Audit entry data structures
//!
//! Defines the structure of audit log entries for backup and restore
//! operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureKind;

/// Types of operations that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// An artifact was produced
    BackupCreated,
    /// Live state was replaced from an artifact
    RestoreCompleted,
    /// A restore was attempted and failed
    RestoreFailed,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::BackupCreated => write!(f, "BACKUP"),
            Operation::RestoreCompleted => write!(f, "RESTORE"),
            Operation::RestoreFailed => write!(f, "RESTORE-FAILED"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id
    pub id: Uuid,

    /// When the operation occurred (UTC)
    pub timestamp: DateTime<Utc>,

    /// Type of operation performed
    pub operation: Operation,

    /// Who asked for the operation
    pub requested_by: String,

    /// Size of the plaintext archive in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_size: Option<u64>,

    /// Leading characters of the archive digest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_prefix: Option<String>,

    /// Failure class for failed operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// Free-form detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    fn new(operation: Operation, requested_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            requested_by: requested_by.into(),
            artifact_size: None,
            digest_prefix: None,
            failure: None,
            detail: None,
        }
    }

    /// Entry for a successfully created backup
    pub fn backup_created(
        requested_by: impl Into<String>,
        artifact_size: u64,
        digest_prefix: impl Into<String>,
    ) -> Self {
        Self {
            artifact_size: Some(artifact_size),
            digest_prefix: Some(digest_prefix.into()),
            ..Self::new(Operation::BackupCreated, requested_by)
        }
    }

    /// Entry for a completed restore
    pub fn restore_completed(
        requested_by: impl Into<String>,
        artifact_size: u64,
        digest_prefix: impl Into<String>,
        restored_files: usize,
    ) -> Self {
        Self {
            artifact_size: Some(artifact_size),
            digest_prefix: Some(digest_prefix.into()),
            detail: Some(format!("{} files restored", restored_files)),
            ..Self::new(Operation::RestoreCompleted, requested_by)
        }
    }

    /// Entry for a failed restore
    pub fn restore_failed(
        requested_by: impl Into<String>,
        failure: FailureKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            failure: Some(failure),
            detail: Some(detail.into()),
            ..Self::new(Operation::RestoreFailed, requested_by)
        }
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} by {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.requested_by
        );

        if let Some(size) = self.artifact_size {
            output.push_str(&format!(", {} bytes", size));
        }
        if let Some(prefix) = &self.digest_prefix {
            output.push_str(&format!(", digest {}", prefix));
        }
        if let Some(kind) = &self.failure {
            output.push_str(&format!("\n  Failure: {}", kind));
        }
        if let Some(detail) = &self.detail {
            output.push_str(&format!("\n  {}", detail));
        }

        output
    }
}
