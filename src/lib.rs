//! rollcall-vault - encrypted backup and restore for a school attendance system
//!
//! This library produces a single portable artifact holding every record in
//! the structured-data store plus every uploaded file, protected by a user
//! password, and restores live state from such an artifact only after its
//! integrity and origin have been verified.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, settings and the injected backup configuration
//! - `error`: Custom error types
//! - `crypto`: Key derivation, encryption, digests and authentication codes
//! - `storage`: Live-state collaborators (data store and file root)
//! - `audit`: Audit logging system
//! - `backup`: Archive, artifact codec and the backup/restore pipelines
//! - `cli`: Command handlers for the binary
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall_vault::config::{BackupConfig, Settings, VaultPaths};
//!
//! let paths = VaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let config = BackupConfig::from_env(paths, settings)?;
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;

pub use error::{FailureKind, VaultError, VaultResult};
