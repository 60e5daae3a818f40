//! Content digest and keyed authentication code for archive bytes
//!
//! Both are computed over the plaintext archive, before encryption. The
//! authentication key is the operator's server secret, never the backup
//! password.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{VaultError, VaultResult};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of `bytes`, lowercase hex
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// HMAC-SHA256 of `bytes` under `secret`, lowercase hex
pub fn authenticate(bytes: &[u8], secret: &[u8]) -> VaultResult<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|e| VaultError::Encryption(format!("HMAC init failed: {}", e)))?;
    mac.update(bytes);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `bytes` against a recorded hex digest
pub fn verify_digest(bytes: &[u8], expected_hex: &str) -> bool {
    if !is_lower_hex(expected_hex) {
        return false;
    }
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let actual = Sha256::digest(bytes);
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

/// Check `bytes` against a recorded hex authentication code, in constant time
pub fn verify_authentication(bytes: &[u8], secret: &[u8], expected_hex: &str) -> bool {
    if !is_lower_hex(expected_hex) {
        return false;
    }
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret) else {
        return false;
    };
    mac.update(bytes);
    mac.verify_slice(&expected).is_ok()
}

// Only the exact encoding we emit is accepted, so any edit to the field fails.
fn is_lower_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// First `len` characters of a hex digest, for logs and audit records
pub fn digest_prefix(hex_digest: &str, len: usize) -> &str {
    let end = hex_digest
        .char_indices()
        .nth(len)
        .map(|(i, _)| i)
        .unwrap_or(hex_digest.len());
    &hex_digest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"server-signing-secret";

    #[test]
    fn test_digest_known_value() {
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_is_pure() {
        assert_eq!(digest(b"archive"), digest(b"archive"));
        assert_ne!(digest(b"archive"), digest(b"archivf"));
    }

    #[test]
    fn test_authenticate_depends_on_secret() {
        let a = authenticate(b"archive", SECRET).unwrap();
        let b = authenticate(b"archive", b"another-secret-value").unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_digest() {
        let d = digest(b"payload");
        assert!(verify_digest(b"payload", &d));
        assert!(!verify_digest(b"payload!", &d));
        assert!(!verify_digest(b"payload", "not-hex"));
        assert!(!verify_digest(b"payload", &d[..10]));
        assert!(!verify_digest(b"payload", &d.to_uppercase()));
    }

    #[test]
    fn test_verify_authentication() {
        let code = authenticate(b"payload", SECRET).unwrap();
        assert!(verify_authentication(b"payload", SECRET, &code));
        assert!(!verify_authentication(b"payload", b"wrong-secret-value", &code));
        assert!(!verify_authentication(b"payloaD", SECRET, &code));
        assert!(!verify_authentication(b"payload", SECRET, "zz"));
    }

    #[test]
    fn test_digest_prefix() {
        let d = digest(b"x");
        assert_eq!(digest_prefix(&d, 12).len(), 12);
        assert_eq!(digest_prefix("abc", 12), "abc");
    }
}
