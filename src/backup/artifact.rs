//! Transport envelope for encrypted backups
//!
//! An artifact is a small JSON document carrying the sealed archive plus its
//! integrity fields. `version` can be read without decrypting anything, so
//! tools can tell formats apart.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Protocol revision written into every artifact
pub const FORMAT_VERSION: &str = "rollcall-backup/1";

const REQUIRED_FIELDS: [&str; 3] = ["ciphertext", "contentDigest", "authenticationCode"];

/// Non-sensitive display fields copied from the archive metadata
///
/// Never used for any trust decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub institution_name: String,
    pub file_count: usize,
}

/// The encrypted backup artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupArtifact {
    /// Protocol revision
    pub version: String,
    /// Base64 of the sealed archive
    pub ciphertext: String,
    /// SHA-256 of the plaintext archive, lowercase hex
    pub content_digest: String,
    /// HMAC-SHA256 of the plaintext archive, lowercase hex
    pub authentication_code: String,
    /// Informational creation time
    pub created_at: DateTime<Utc>,
    /// Informational plaintext archive size in bytes
    #[serde(default)]
    pub declared_size: u64,
    /// Informational display fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<ContextSummary>,
}

impl BackupArtifact {
    /// Build an artifact around sealed bytes
    pub fn new(
        sealed: &[u8],
        content_digest: String,
        authentication_code: String,
        declared_size: u64,
        context_summary: Option<ContextSummary>,
    ) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            ciphertext: STANDARD.encode(sealed),
            content_digest,
            authentication_code,
            created_at: Utc::now(),
            declared_size,
            context_summary,
        }
    }

    /// Decode the base64 ciphertext
    ///
    /// The field is present at this point, so text that does not decode is
    /// damaged content and reported as `CorruptArchive`.
    pub fn sealed_bytes(&self) -> VaultResult<Vec<u8>> {
        STANDARD
            .decode(self.ciphertext.as_bytes())
            .map_err(|e| VaultError::CorruptArchive(format!("Ciphertext is not base64: {}", e)))
    }

    /// Get a short summary for display
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} created {}, {} bytes",
            self.version,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.declared_size
        );
        if let Some(ctx) = &self.context_summary {
            out.push_str(&format!(
                ", {} ({} files)",
                ctx.institution_name, ctx.file_count
            ));
        }
        out
    }
}

/// Serialize an artifact to its transport form
pub fn encode(artifact: &BackupArtifact) -> VaultResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(artifact)?)
}

/// Parse and check an artifact without decrypting it
pub fn decode(bytes: &[u8]) -> VaultResult<BackupArtifact> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| VaultError::InvalidArtifact(format!("Not a JSON document: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| VaultError::InvalidArtifact("Artifact is not a JSON object".into()))?;

    for field in REQUIRED_FIELDS {
        match object.get(field).and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => {}
            _ => {
                return Err(VaultError::InvalidArtifact(format!(
                    "Missing or empty field: {}",
                    field
                )))
            }
        }
    }

    let version = object
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if version != FORMAT_VERSION {
        return Err(VaultError::UnsupportedVersion {
            version: version.to_string(),
        });
    }

    let artifact: BackupArtifact = serde_json::from_value(value)
        .map_err(|e| VaultError::InvalidArtifact(format!("Bad artifact field: {}", e)))?;

    // Reject bad base64 here rather than at the decryption stage
    artifact.sealed_bytes()?;

    Ok(artifact)
}

/// Decode an artifact for display (`backup info`)
pub fn inspect(bytes: &[u8]) -> VaultResult<BackupArtifact> {
    decode(bytes)
}
