// crates/orderflow-core/src/core/hashing.rs
// ============================================================================
// Module: Orderflow Content Hashing
// Description: RFC 8785 JSON canonicalization and SHA-256 content digests.
// Purpose: Provide deterministic digests for artifacts, events, and bundles.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every artifact Orderflow stores is content-addressed: JSON artifacts are
//! hashed over RFC 8785 (JCS) canonical bytes so semantically identical
//! documents always produce the same digest, and binary payloads (the original
//! spreadsheet) are hashed over raw bytes. Fingerprints and audit manifests
//! build on these digests, so hashing determinism is part of audit integrity.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Digest
// ============================================================================

/// Lowercase hex-encoded SHA-256 digest.
///
/// # Invariants
/// - The inner string is always 64 lowercase hex characters when produced by
///   this module; digests parsed from external input are validated by
///   [`Sha256Digest::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Hashes raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex_encode(&hasher.finalize()))
    }

    /// Hashes the RFC 8785 canonical form of a serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when serialization fails.
    pub fn of_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, HashError> {
        Ok(Self::of_bytes(&canonical_json_bytes(value)?))
    }

    /// Validates and wraps an externally supplied hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Canonicalization`] when the input is not 64
    /// lowercase hex characters.
    pub fn parse(value: &str) -> Result<Self, HashError> {
        let valid =
            value.len() == 64 && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(HashError::Canonicalization(format!("not a sha-256 hex digest: {value}")))
        }
    }

    /// Returns the digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Canonical JSON
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
