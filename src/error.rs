//! Custom error types for rollcall-vault
//!
//! This module defines the error hierarchy for the backup and restore core
//! using thiserror. Every failure the pipelines can produce has its own
//! variant so callers can pick the right status and message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for rollcall-vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Configuration-related errors (including a missing server secret)
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Errors raised by the live-state collaborators
    #[error("Storage error: {0}")]
    Storage(String),

    /// Password shorter than the configured minimum
    #[error("Password is too weak: at least {min_length} characters are required")]
    WeakPassword { min_length: usize },

    /// Password and confirmation differ
    #[error("Password and confirmation do not match")]
    PasswordMismatch,

    /// The structured-data export could not be produced
    #[error("Data export unavailable: {0}")]
    MissingDataExport(String),

    /// The archive container is unreadable or incomplete
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// An archive entry would resolve outside the extraction root
    #[error("Archive entry escapes extraction root: {entry}")]
    PathTraversal { entry: String },

    /// The transport envelope is missing required fields or is not parseable
    #[error("Invalid backup artifact: {0}")]
    InvalidArtifact(String),

    /// The envelope declares a protocol revision we do not understand
    #[error("Unsupported backup format version: {version}")]
    UnsupportedVersion { version: String },

    /// Wrong password, or ciphertext that cannot be opened with it
    #[error("Wrong password or unreadable backup")]
    WrongPassword,

    /// Plaintext does not match the recorded digest
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// Plaintext does not match the recorded authentication code
    #[error("Archive failed authentication: {0}")]
    UnauthenticatedArchive(String),

    /// Data store was replaced but the file root was not
    #[error("Partial restore: {reason} (data store rolled back: {data_rolled_back})")]
    PartialRestore {
        reason: String,
        data_rolled_back: bool,
    },

    /// Another restore holds the restore lock
    #[error("A restore is already in progress")]
    RestoreInProgress,

    /// The caller cancelled the operation
    #[error("Operation cancelled during {stage}")]
    Cancelled { stage: String },

    /// Cipher setup or sealing failures unrelated to the password
    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// Coarse failure classes reported to the hosting application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    WrongPassword,
    CorruptArchive,
    Unauthenticated,
    MalformedArchive,
    PartialRestore,
    RestoreInProgress,
    InvalidInput,
    Cancelled,
    Storage,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::WrongPassword => "WrongPassword",
            FailureKind::CorruptArchive => "CorruptArchive",
            FailureKind::Unauthenticated => "Unauthenticated",
            FailureKind::MalformedArchive => "MalformedArchive",
            FailureKind::PartialRestore => "PartialRestore",
            FailureKind::RestoreInProgress => "RestoreInProgress",
            FailureKind::InvalidInput => "InvalidInput",
            FailureKind::Cancelled => "Cancelled",
            FailureKind::Storage => "Storage",
        };
        write!(f, "{}", name)
    }
}

impl VaultError {
    /// Classify this error for reporting
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::WrongPassword => FailureKind::WrongPassword,
            Self::CorruptArchive(_) => FailureKind::CorruptArchive,
            Self::UnauthenticatedArchive(_) => FailureKind::Unauthenticated,
            Self::MalformedArchive(_)
            | Self::PathTraversal { .. }
            | Self::InvalidArtifact(_)
            | Self::UnsupportedVersion { .. } => FailureKind::MalformedArchive,
            Self::PartialRestore { .. } => FailureKind::PartialRestore,
            Self::RestoreInProgress => FailureKind::RestoreInProgress,
            Self::WeakPassword { .. } | Self::PasswordMismatch => FailureKind::InvalidInput,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Storage(_)
            | Self::MissingDataExport(_)
            | Self::Encryption(_) => FailureKind::Storage,
        }
    }

    /// Message safe to show to an end user
    ///
    /// Wrong password, corrupt ciphertext and authentication failures share
    /// one message so the response does not act as an oracle.
    pub fn user_message(&self) -> String {
        match self {
            Self::WrongPassword | Self::CorruptArchive(_) | Self::UnauthenticatedArchive(_) => {
                "The backup could not be opened. Check the password and that the file is an \
                 unmodified backup from this system."
                    .to_string()
            }
            Self::PartialRestore { .. } => {
                "The restore stopped after the database was replaced but before uploaded files \
                 were restored. Do not retry; an operator must inspect the system."
                    .to_string()
            }
            Self::RestoreInProgress => {
                "Another restore is already running. Wait for it to finish.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether this error leaves the system needing manual attention
    pub fn requires_operator(&self) -> bool {
        matches!(self, Self::PartialRestore { .. })
    }

    /// Whether the caller may safely try the same operation again
    pub fn is_retryable(&self) -> bool {
        !self.requires_operator()
    }

    /// Whether the request itself was rejected before any work ran
    pub fn is_input_error(&self) -> bool {
        self.kind() == FailureKind::InvalidInput
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for rollcall-vault operations
pub type VaultResult<T> = Result<T, VaultError>;
