//! Configuration module for rollcall-vault
//!
//! This module provides configuration management including:
//! - XDG-compliant path resolution
//! - Operator settings persistence
//! - The injected backup configuration carrying the server secret

pub mod backup;
pub mod paths;
pub mod settings;

pub use backup::BackupConfig;
pub use paths::VaultPaths;
pub use settings::{KdfSettings, Settings};
