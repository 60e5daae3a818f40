//! Path management for rollcall-vault
//!
//! Provides XDG-compliant path resolution for settings, live state, the
//! scoped work area and the audit log.
//!
//! ## Path Resolution Order
//!
//! 1. `ROLLCALL_VAULT_DIR` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_CONFIG_HOME/rollcall` or `~/.config/rollcall`
//! 3. Windows: `%APPDATA%\rollcall`

use std::path::PathBuf;

use crate::error::VaultError;

/// Manages all paths used by rollcall-vault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Base directory for all Rollcall data
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Create a new VaultPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, VaultError> {
        let base_dir = if let Ok(custom) = std::env::var("ROLLCALL_VAULT_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the directory holding the structured-data store
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Get the path to the structured-data store
    pub fn data_file(&self) -> PathBuf {
        self.data_dir().join("records.json")
    }

    /// Get the binary file root (uploaded logos, photos, documents)
    pub fn uploads_dir(&self) -> PathBuf {
        self.base_dir.join("uploads")
    }

    /// Get the default directory for produced artifacts
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Get the scoped work area for per-invocation temporary directories
    pub fn temp_dir(&self) -> PathBuf {
        self.base_dir.join("tmp")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Get the path to the restore lock file
    pub fn restore_lock(&self) -> PathBuf {
        self.base_dir.join("restore.lock")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), VaultError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| VaultError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.data_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create data directory: {}", e)))?;

        std::fs::create_dir_all(self.uploads_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create uploads directory: {}", e)))?;

        std::fs::create_dir_all(self.backup_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create backup directory: {}", e)))?;

        std::fs::create_dir_all(self.temp_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create temp directory: {}", e)))?;

        Ok(())
    }
}

/// Resolve the default data directory path based on platform
#[cfg(not(windows))]
fn resolve_default_path() -> Result<PathBuf, VaultError> {
    let config_base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let home = std::env::var("HOME")
                .map_err(|_| VaultError::Config("HOME environment variable not set".into()))?;
            PathBuf::from(home).join(".config")
        }
    };
    Ok(config_base.join("rollcall"))
}

/// Resolve the default data directory path based on platform
#[cfg(windows)]
fn resolve_default_path() -> Result<PathBuf, VaultError> {
    let appdata = std::env::var("APPDATA")
        .map_err(|_| VaultError::Config("Could not determine APPDATA directory".into()))?;
    Ok(PathBuf::from(appdata).join("rollcall"))
}
