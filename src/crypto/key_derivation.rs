//! Key derivation using Argon2id
//!
//! Derives encryption keys from backup passwords using Argon2id,
//! a memory-hard key derivation function resistant to GPU/ASIC attacks.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use argon2::{Argon2, Params};
use zeroize::Zeroize;

use crate::config::KdfSettings;
use crate::error::{VaultError, VaultResult};

/// Salt length in bytes
pub const SALT_SIZE: usize = 16;

/// Derived key length in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Parameters for key derivation, stored alongside each sealed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDerivationParams {
    /// Random per-artifact salt
    pub salt: [u8; SALT_SIZE],
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism degree
    pub parallelism: u32,
}

impl KeyDerivationParams {
    /// Create new params with a random salt
    pub fn new(costs: &KdfSettings) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        Self::with_values(salt, costs.memory_cost, costs.time_cost, costs.parallelism)
    }

    /// Create params with specific values
    pub fn with_values(
        salt: [u8; SALT_SIZE],
        memory_cost: u32,
        time_cost: u32,
        parallelism: u32,
    ) -> Self {
        Self {
            salt,
            memory_cost,
            time_cost,
            parallelism,
        }
    }
}

/// A derived encryption key
pub struct DerivedKey {
    key: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive an encryption key from a password
///
/// Invalid cost parameters (for instance read from a damaged artifact) are
/// reported as `Encryption` errors; callers decide how to surface them.
pub fn derive_key(password: &str, params: &KeyDerivationParams) -> VaultResult<DerivedKey> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| VaultError::Encryption(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut key = [0u8; KEY_SIZE];
    if let Err(e) = argon2.hash_password_into(password.as_bytes(), &params.salt, &mut key) {
        key.zeroize();
        return Err(VaultError::Encryption(format!("Key derivation failed: {}", e)));
    }

    Ok(DerivedKey { key })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key() {
        let params = KeyDerivationParams::new(&KdfSettings::fast());
        let key = derive_key("test_passphrase", &params).unwrap();
        assert_eq!(key.as_bytes().len(), KEY_SIZE);
    }

    #[test]
    fn test_same_passphrase_same_key() {
        let params = KeyDerivationParams::new(&KdfSettings::fast());
        let key1 = derive_key("test_passphrase", &params).unwrap();
        let key2 = derive_key("test_passphrase", &params).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_passphrase_different_key() {
        let params = KeyDerivationParams::new(&KdfSettings::fast());
        let key1 = derive_key("passphrase1", &params).unwrap();
        let key2 = derive_key("passphrase2", &params).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let params1 = KeyDerivationParams::new(&KdfSettings::fast());
        let params2 = KeyDerivationParams::new(&KdfSettings::fast());
        let key1 = derive_key("same_passphrase", &params1).unwrap();
        let key2 = derive_key("same_passphrase", &params2).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_invalid_costs_rejected() {
        let params = KeyDerivationParams::with_values([7u8; SALT_SIZE], 1, 0, 1);
        assert!(matches!(
            derive_key("pw", &params),
            Err(VaultError::Encryption(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let params = KeyDerivationParams::new(&KdfSettings::fast());
        let key = derive_key("test_passphrase", &params).unwrap();
        assert_eq!(format!("{:?}", key), "DerivedKey([REDACTED])");
    }
}
