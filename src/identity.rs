//! Content identity derivation and normalization.
//!
//! Documents are addressed by a 128-bit identifier derived from the SHA-256
//! digest of their raw bytes: identical payloads always map to the same
//! identifier, which is what makes re-ingestion idempotent. Truncating the
//! 256-bit digest to identifier width is a deliberate, lossy compression;
//! the residual collision probability is accepted.

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// An identity value as supplied with a record, before normalization.
///
/// Record assembly may hand the pipeline a digest computed elsewhere or an
/// already-canonical identifier; [`coerce_identity`] maps every accepted
/// shape onto the same canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// Already-canonical identifier.
    Uuid(Uuid),
    /// Raw bytes; accepted when exactly 16 bytes long.
    Bytes(Vec<u8>),
    /// Hex digest (32 or 64 chars) or canonical textual UUID.
    Text(String),
}

/// The supplied identity could not be normalized.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("badly formed identity: {0}")]
pub struct MalformedIdentity(pub String);

/// Derive the canonical identifier for a byte payload.
///
/// SHA-256 of the payload, identifier built from the digest's first 16
/// bytes. Deterministic: identical bytes always yield the same identifier.
pub fn derive_identity(bytes: &[u8]) -> Uuid {
    let digest = Sha256::digest(bytes);
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(raw)
}

/// SHA-256 of a payload as lowercase hex.
///
/// This is the digest [`derive_identity`] truncates; the full form is kept
/// in record metadata.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Normalize a supplied identity value into canonical form.
///
/// Accepts a canonical identifier, a 16-byte raw value, a 32-char hex
/// string, a 64-char hex digest (truncated consistently with
/// [`derive_identity`]), or canonical UUID text. Everything else fails with
/// [`MalformedIdentity`].
pub fn coerce_identity(value: &IdentitySource) -> Result<Uuid, MalformedIdentity> {
    match value {
        IdentitySource::Uuid(id) => Ok(*id),
        IdentitySource::Bytes(raw) => {
            if raw.len() == 16 {
                let mut buf = [0u8; 16];
                buf.copy_from_slice(raw);
                Ok(Uuid::from_bytes(buf))
            } else {
                Err(MalformedIdentity(format!(
                    "raw identity must be 16 bytes, got {}",
                    raw.len()
                )))
            }
        }
        IdentitySource::Text(s) => coerce_text(s),
    }
}

fn coerce_text(s: &str) -> Result<Uuid, MalformedIdentity> {
    let is_hex = !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit());
    if is_hex && (s.len() == 32 || s.len() == 64) {
        let raw =
            hex::decode(s).map_err(|e| MalformedIdentity(format!("hex decode failed: {e}")))?;
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&raw[..16]);
        return Ok(Uuid::from_bytes(buf));
    }

    Uuid::parse_str(s)
        .map_err(|_| MalformedIdentity(format!("not a hex digest or canonical UUID: {s:?}")))
}
