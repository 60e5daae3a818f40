//! Cryptographic functions for rollcall-vault
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation for the
//! archive payload, plus the SHA-256 digest and HMAC-SHA256 authentication
//! code recorded beside it.

pub mod encryption;
pub mod integrity;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{decrypt, encrypt};
pub use integrity::{authenticate, digest, verify_authentication, verify_digest};
pub use key_derivation::{derive_key, DerivedKey, KeyDerivationParams};
pub use secure_memory::{SecureBytes, SecureString};
