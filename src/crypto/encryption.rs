//! AES-256-GCM sealing of archive bytes under a password-derived key
//!
//! Sealed layout:
//!
//! ```text
//! "RCV1" | m_cost u32le | t_cost u32le | p_cost u32le | salt[16] | nonce[12]
//!        | key_check[16] | header_sum[8] | ciphertext+tag
//! ```
//!
//! `key_check` lets a wrong password be told apart from a damaged body, and
//! `header_sum` lets a damaged header be told apart from a wrong password.
//! The whole header is bound to the ciphertext as associated data.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::KdfSettings;
use crate::error::{VaultError, VaultResult};

use super::key_derivation::{derive_key, DerivedKey, KeyDerivationParams, SALT_SIZE};

const MAGIC: &[u8; 4] = b"RCV1";

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

const KEY_CHECK_SIZE: usize = 16;
const HEADER_SUM_SIZE: usize = 8;
const TAG_SIZE: usize = 16;
const KEY_CHECK_LABEL: &[u8] = b"rollcall-vault key check";

// Upper bounds on costs read back from a header (1 GiB, 16 passes, 64 lanes)
const MAX_MEMORY_COST: u32 = 1024 * 1024;
const MAX_TIME_COST: u32 = 16;
const MAX_PARALLELISM: u32 = 64;

const COSTS_OFFSET: usize = 4;
const SALT_OFFSET: usize = COSTS_OFFSET + 12;
const NONCE_OFFSET: usize = SALT_OFFSET + SALT_SIZE;
const KEY_CHECK_OFFSET: usize = NONCE_OFFSET + NONCE_SIZE;
const HEADER_SUM_OFFSET: usize = KEY_CHECK_OFFSET + KEY_CHECK_SIZE;
const HEADER_SIZE: usize = HEADER_SUM_OFFSET + HEADER_SUM_SIZE;

/// Encrypt plaintext under a key derived from `password`
///
/// Generates a fresh salt and nonce for each call.
pub fn encrypt(plaintext: &[u8], password: &str, costs: &KdfSettings) -> VaultResult<Vec<u8>> {
    let params = KeyDerivationParams::new(costs);
    let key = derive_key(password, &params)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&params.memory_cost.to_le_bytes());
    header.extend_from_slice(&params.time_cost.to_le_bytes());
    header.extend_from_slice(&params.parallelism.to_le_bytes());
    header.extend_from_slice(&params.salt);
    header.extend_from_slice(&nonce_bytes);
    header.extend_from_slice(&key_check(&key)?);
    let sum = header_sum(&header);
    header.extend_from_slice(&sum);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|e| VaultError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut sealed = header;
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a sealed payload
///
/// # Errors
///
/// - `CorruptArchive` if the header is truncated or damaged, or the body
///   fails authentication under the correct key
/// - `WrongPassword` if the password does not match, or the plaintext is empty
pub fn decrypt(sealed: &[u8], password: &str) -> VaultResult<Vec<u8>> {
    if sealed.len() < HEADER_SIZE + TAG_SIZE {
        return Err(VaultError::CorruptArchive(
            "sealed payload is truncated".to_string(),
        ));
    }

    let (header, body) = sealed.split_at(HEADER_SIZE);

    if &header[..COSTS_OFFSET] != MAGIC {
        return Err(VaultError::CorruptArchive(
            "sealed payload has an unknown header".to_string(),
        ));
    }

    if header_sum(&header[..HEADER_SUM_OFFSET]) != header[HEADER_SUM_OFFSET..] {
        return Err(VaultError::CorruptArchive(
            "sealed payload header checksum mismatch".to_string(),
        ));
    }

    let params = read_params(header);
    if params.memory_cost > MAX_MEMORY_COST
        || params.time_cost > MAX_TIME_COST
        || params.parallelism > MAX_PARALLELISM
    {
        return Err(VaultError::CorruptArchive(
            "sealed payload declares unreasonable key derivation costs".to_string(),
        ));
    }
    let key = derive_key(password, &params).map_err(|_| VaultError::WrongPassword)?;

    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("HMAC init failed: {}", e)))?;
    mac.update(KEY_CHECK_LABEL);
    if mac
        .verify_truncated_left(&header[KEY_CHECK_OFFSET..HEADER_SUM_OFFSET])
        .is_err()
    {
        return Err(VaultError::WrongPassword);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&header[NONCE_OFFSET..KEY_CHECK_OFFSET]),
            Payload {
                msg: body,
                aad: header,
            },
        )
        .map_err(|_| {
            VaultError::CorruptArchive("ciphertext failed authentication".to_string())
        })?;

    if plaintext.is_empty() {
        return Err(VaultError::WrongPassword);
    }

    Ok(plaintext)
}

fn key_check(key: &DerivedKey) -> VaultResult<[u8; KEY_CHECK_SIZE]> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("HMAC init failed: {}", e)))?;
    mac.update(KEY_CHECK_LABEL);
    let full = mac.finalize().into_bytes();

    let mut check = [0u8; KEY_CHECK_SIZE];
    check.copy_from_slice(&full[..KEY_CHECK_SIZE]);
    Ok(check)
}

fn header_sum(header: &[u8]) -> [u8; HEADER_SUM_SIZE] {
    let full = Sha256::digest(header);
    let mut sum = [0u8; HEADER_SUM_SIZE];
    sum.copy_from_slice(&full[..HEADER_SUM_SIZE]);
    sum
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

fn read_params(header: &[u8]) -> KeyDerivationParams {
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&header[SALT_OFFSET..NONCE_OFFSET]);
    KeyDerivationParams::with_values(
        salt,
        read_u32(header, COSTS_OFFSET),
        read_u32(header, COSTS_OFFSET + 4),
        read_u32(header, COSTS_OFFSET + 8),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seal(plaintext: &[u8], password: &str) -> Vec<u8> {
        encrypt(plaintext, password, &KdfSettings::fast()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = b"Hello, World! This is a test message.";
        let sealed = seal(plaintext, "Str0ngPass!");
        let decrypted = decrypt(&sealed, "Str0ngPass!").unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealed = seal(b"Secret data", "Str0ngPass!");
        let result = decrypt(&sealed, "wrong-pass");
        assert!(matches!(result, Err(VaultError::WrongPassword)));
    }

    #[test]
    fn test_unique_nonce_and_salt() {
        let a = seal(b"Same message", "password1");
        let b = seal(b"Same message", "password1");
        assert_ne!(a, b);
        assert_ne!(a[SALT_OFFSET..NONCE_OFFSET], b[SALT_OFFSET..NONCE_OFFSET]);
    }

    #[test]
    fn test_costs_recorded_in_header() {
        let sealed = seal(b"data", "password1");
        let params = read_params(&sealed[..HEADER_SIZE]);
        assert_eq!(params.memory_cost, KdfSettings::fast().memory_cost);
        assert_eq!(params.time_cost, 1);
        assert_eq!(params.parallelism, 1);
    }

    #[test]
    fn test_body_tamper_is_corruption() {
        let mut sealed = seal(b"Important data", "password1");
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            decrypt(&sealed, "password1"),
            Err(VaultError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_every_header_byte_is_covered() {
        let sealed = seal(b"Important data", "password1");
        for i in 0..HEADER_SIZE {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x80;
            let result = decrypt(&tampered, "password1");
            assert!(
                matches!(result, Err(VaultError::CorruptArchive(_))),
                "byte {} not detected: {:?}",
                i,
                result
            );
        }
    }

    #[test]
    fn test_truncated_payload() {
        let sealed = seal(b"Important data", "password1");
        assert!(matches!(
            decrypt(&sealed[..HEADER_SIZE], "password1"),
            Err(VaultError::CorruptArchive(_))
        ));
        assert!(matches!(
            decrypt(&[], "password1"),
            Err(VaultError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_inflated_costs_rejected_before_derivation() {
        let mut sealed = seal(b"Important data", "password1");
        sealed[COSTS_OFFSET..COSTS_OFFSET + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let sum = header_sum(&sealed[..HEADER_SUM_OFFSET]);
        sealed[HEADER_SUM_OFFSET..HEADER_SIZE].copy_from_slice(&sum);

        assert!(matches!(
            decrypt(&sealed, "password1"),
            Err(VaultError::CorruptArchive(_))
        ));
    }

    #[test]
    fn test_empty_plaintext_treated_as_wrong_password() {
        let sealed = seal(b"", "password1");
        assert!(matches!(
            decrypt(&sealed, "password1"),
            Err(VaultError::WrongPassword)
        ));
    }
}
