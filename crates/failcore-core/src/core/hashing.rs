// crates/failcore-core/src/core/hashing.rs
// ============================================================================
// Module: Failcore Content Digests
// Description: The canonical digest type carried by traces, evidence, and keys.
// Purpose: Give every hashed surface one value type with a shareable short form.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every digest in Failcore is a `ContentHash`: sha256 over either raw
//! bytes or the RFC 8785 (JCS) canonical form of a JSON value, rendered as
//! lowercase hex. Policy hashes, registry signatures, and replay keys carry
//! the full hex form; evidence summaries carry [`ContentHash::short`], which
//! is long enough to correlate findings without widening the surface a
//! trace reader can mine. Secret material never appears anywhere a digest
//! does; the digest *is* the evidence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hex length of the shortened digest form used in evidence summaries.
pub const SHORT_HASH_LEN: usize = 12;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when a value cannot be canonicalised.
#[derive(Debug, Error)]
pub enum CanonicalJsonError {
    /// The value does not serialise to RFC 8785 canonical JSON.
    #[error("value does not canonicalise to rfc 8785 json: {0}")]
    Unrepresentable(String),
}

// ============================================================================
// SECTION: Content Hash
// ============================================================================

/// Canonical sha256 digest in lowercase hex.
///
/// # Invariants
/// - Always 64 lowercase hex characters; serialises as a bare string.
/// - Equal inputs produce equal hashes across processes and platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Digests the RFC 8785 canonical form of a serialisable value.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalJsonError`] when the value fails to serialise
    /// (non-finite numbers, non-string map keys).
    pub fn of_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, CanonicalJsonError> {
        Ok(Self::of_bytes(&canonical_json_bytes(value)?))
    }

    /// Digests raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let hex = digest.iter().fold(String::with_capacity(digest.len() * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        });
        Self(hex)
    }

    /// Digests a UTF-8 string.
    #[must_use]
    pub fn of_str(text: &str) -> Self {
        Self::of_bytes(text.as_bytes())
    }

    /// Returns the full lowercase hex form.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Returns the shortened form used in evidence summaries.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..SHORT_HASH_LEN).unwrap_or(&self.0)
    }

    /// Consumes the digest into its full hex string.
    #[must_use]
    pub fn into_hex(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Canonicalisation
// ============================================================================

/// Returns the RFC 8785 canonical JSON bytes of a serialisable value.
///
/// Canonical form sorts keys, uses the shortest stable number rendering,
/// and rejects NaN and infinities.
///
/// # Errors
///
/// Returns [`CanonicalJsonError`] when serialisation fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(
    value: &T,
) -> Result<Vec<u8>, CanonicalJsonError> {
    serde_jcs::to_vec(value).map_err(|err| CanonicalJsonError::Unrepresentable(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::ContentHash;
    use super::SHORT_HASH_LEN;

    /// Tests key order does not affect the canonical hash.
    #[test]
    fn test_canonical_hash_ignores_key_order() {
        let a = ContentHash::of_canonical_json(&json!({"b": 1, "a": 2})).unwrap();
        let b = ContentHash::of_canonical_json(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a, b);
    }

    /// Tests the digest shapes: 64 hex characters, 12 for the short form.
    #[test]
    fn test_digest_shapes() {
        let digest = ContentHash::of_str("payload");
        assert_eq!(digest.as_hex().len(), 64);
        assert!(digest.as_hex().chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_uppercase()));
        assert_eq!(digest.short().len(), SHORT_HASH_LEN);
        assert!(digest.as_hex().starts_with(digest.short()));
    }

    /// Tests string and byte digests agree.
    #[test]
    fn test_str_and_bytes_agree() {
        assert_eq!(ContentHash::of_str("abc"), ContentHash::of_bytes(b"abc"));
    }

    /// Tests the canonical byte form follows the RFC 8785 rules.
    #[test]
    fn test_canonical_form_rules() {
        let bytes = super::canonical_json_bytes(&json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(bytes, br#"{"a":1,"b":2}"#);
    }
}
