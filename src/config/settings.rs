//! Operator settings for rollcall-vault
//!
//! Manages the tunables of the backup protocol: password policy, archive
//! compression, and the cost of the password-based key derivation.

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::error::VaultError;

/// Argon2id cost parameters used when sealing new artifacts
///
/// Restores read the costs from the artifact itself, so changing these only
/// affects backups created afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfSettings {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KdfSettings {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfSettings {
    /// Cheap parameters for tests
    pub fn fast() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Operator settings for the backup subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Institution name recorded in every archive
    #[serde(default = "default_institution_name")]
    pub institution_name: String,

    /// Minimum backup password length
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    /// Gzip level for the archive (0-9, favouring ratio by default)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Key derivation costs
    #[serde(default)]
    pub key_derivation: KdfSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_institution_name() -> String {
    "Unnamed School".to_string()
}

fn default_min_password_length() -> usize {
    8
}

fn default_compression_level() -> u32 {
    9
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            institution_name: default_institution_name(),
            min_password_length: default_min_password_length(),
            compression_level: default_compression_level(),
            key_derivation: KdfSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &VaultPaths) -> Result<Self, VaultError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| VaultError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                VaultError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            settings.validate()?;
            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> Result<(), VaultError> {
        paths.ensure_directories()?;

        let settings_path = paths.settings_file();
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(&settings_path, contents)
            .map_err(|e| VaultError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Reject values the pipelines cannot work with
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.compression_level > 9 {
            return Err(VaultError::Config(format!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }
        if self.min_password_length == 0 {
            return Err(VaultError::Config(
                "min_password_length must be at least 1".to_string(),
            ));
        }
        let kdf = &self.key_derivation;
        if kdf.time_cost == 0 || kdf.parallelism == 0 {
            return Err(VaultError::Config(
                "key_derivation time_cost and parallelism must be positive".to_string(),
            ));
        }
        // Restores refuse artifacts sealed above these costs
        if kdf.memory_cost > 1024 * 1024 || kdf.time_cost > 16 || kdf.parallelism > 64 {
            return Err(VaultError::Config(
                "key_derivation costs exceed 1 GiB, 16 passes or 64 lanes".to_string(),
            ));
        }
        if kdf.memory_cost < 8 * kdf.parallelism {
            return Err(VaultError::Config(
                "key_derivation memory_cost must be at least 8 KiB per lane".to_string(),
            ));
        }
        Ok(())
    }
}
