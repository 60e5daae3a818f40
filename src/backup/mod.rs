//! Encrypted backup and restore
//!
//! # Architecture
//!
//! - `archive`: tar.gz container holding the data export, file tree and
//!   context metadata
//! - `artifact`: JSON transport envelope around the sealed archive
//! - `BackupManager`: export → archive → digest → authenticate → encrypt
//! - `RestoreManager`: the reverse, with every check done before live state
//!   is replaced
//! - `worker`: runs either pipeline on its own thread with cancellation
//!
//! # Artifact Format
//!
//! ```text
//! {
//!   "version": "rollcall-backup/1",
//!   "ciphertext": "<base64>",
//!   "contentDigest": "<sha-256 hex>",
//!   "authenticationCode": "<hmac-sha256 hex>",
//!   "createdAt": "<ISO-8601>",
//!   "declaredSize": 12345,
//!   "contextSummary": { "institutionName": "...", "fileCount": 3 }
//! }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall_vault::backup::{BackupManager, BackupRequest, RestoreManager};
//!
//! let backups = BackupManager::new(config.clone(), store.clone(), files.clone());
//! let outcome = backups.create_backup(BackupRequest::new(password).requested_by("principal"))?;
//!
//! let restores = RestoreManager::new(config, store, files);
//! let report = restores.restore_backup(&outcome.encoded, "the password")?;
//! assert!(report.restart_required);
//! ```

pub mod archive;
pub mod artifact;
mod lock;
mod manager;
mod restore;
mod worker;

pub use archive::{ArchiveMetadata, ExtractedArchive};
pub use artifact::{BackupArtifact, ContextSummary, FORMAT_VERSION};
pub use lock::RestoreLock;
pub use manager::{BackupManager, BackupOutcome, BackupRequest, BackupStage};
pub use restore::{RestoreManager, RestoreOutcome, RestoreReport, RestoreRequest, RestoreStage};
pub use worker::{spawn_backup, spawn_restore, CancelToken};
