//! Runtime configuration injected into the backup and restore pipelines
//!
//! The server authentication secret is read exactly once, when this struct
//! is built at startup. Nothing else in the crate reads the environment.

use super::paths::VaultPaths;
use super::settings::Settings;
use crate::crypto::SecureBytes;
use crate::error::{VaultError, VaultResult};

/// Environment variable holding the server authentication secret
pub const SECRET_ENV_VAR: &str = "ROLLCALL_BACKUP_SECRET";

/// Shortest accepted server secret, in bytes
pub const MIN_SECRET_LEN: usize = 16;

/// Everything the orchestrators need besides their collaborators
#[derive(Debug)]
pub struct BackupConfig {
    paths: VaultPaths,
    settings: Settings,
    auth_secret: SecureBytes,
}

impl BackupConfig {
    /// Build a config with an explicit server secret
    pub fn new(
        paths: VaultPaths,
        settings: Settings,
        auth_secret: impl Into<SecureBytes>,
    ) -> VaultResult<Self> {
        let auth_secret = auth_secret.into();
        if auth_secret.len() < MIN_SECRET_LEN {
            return Err(VaultError::Config(format!(
                "backup authentication secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        settings.validate()?;

        Ok(Self {
            paths,
            settings,
            auth_secret,
        })
    }

    /// Build a config reading the server secret from `ROLLCALL_BACKUP_SECRET`
    ///
    /// A missing or empty secret is fatal for the subsystem; there is no
    /// fallback value.
    pub fn from_env(paths: VaultPaths, settings: Settings) -> VaultResult<Self> {
        let secret = std::env::var(SECRET_ENV_VAR).map_err(|_| {
            VaultError::Config(format!(
                "{} is not set; backups are disabled until it is configured",
                SECRET_ENV_VAR
            ))
        })?;

        if secret.trim().is_empty() {
            return Err(VaultError::Config(format!("{} is empty", SECRET_ENV_VAR)));
        }

        Self::new(paths, settings, SecureBytes::new(secret.into_bytes()))
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Server secret used for the archive authentication code
    pub fn auth_secret(&self) -> &[u8] {
        self.auth_secret.as_bytes()
    }
}
