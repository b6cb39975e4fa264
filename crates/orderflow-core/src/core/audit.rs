// crates/orderflow-core/src/core/audit.rs
// ============================================================================
// Module: Orderflow Audit Bundle
// Description: Sealed content-addressed manifest over every case artifact.
// Purpose: Make terminal cases independently verifiable offline.
// Dependencies: crate::core::{case, events, hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! At terminal status (and on entry to `queued_for_retry`) the engine seals an
//! audit bundle: a manifest listing every artifact the case produced with its
//! digest, plus the event-log excerpt or a pointer to it. The manifest is
//! itself content-addressed and immutable; its digest is stored on the case
//! record so any later tampering is detectable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::case::CaseStatus;
use crate::core::events::AuditEvent;
use crate::core::events::BlobPointer;
use crate::core::hashing::HashError;
use crate::core::hashing::Sha256Digest;
use crate::core::identifiers::CaseId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Manifest Entries
// ============================================================================

/// One artifact reference inside the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Evidence-store path relative to the store root.
    pub path: String,
    /// Digest of the stored bytes.
    pub sha256: Sha256Digest,
}

/// Event-log excerpt carried in or referenced by the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventLogRef {
    /// Full excerpt inlined into the manifest.
    Inline {
        /// Events in sequence order.
        events: Vec<AuditEvent>,
    },
    /// Pointer to the JSONL excerpt in the evidence store.
    Pointer {
        /// Blob pointer to the excerpt.
        pointer: BlobPointer,
    },
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Sealed audit-bundle manifest.
///
/// # Invariants
/// - Entries are sorted by path, so the manifest digest is independent of
///   collection order.
/// - The manifest references every artifact recorded in the case's event
///   log; verification fails closed on any missing or mismatched artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditManifest {
    /// Case the bundle belongs to.
    pub case_id: CaseId,
    /// Final case status at sealing time.
    pub final_status: CaseStatus,
    /// Sealing timestamp.
    pub finalized_at: Timestamp,
    /// Artifact references, sorted by path.
    pub artifacts: Vec<ManifestEntry>,
    /// Event-log excerpt or pointer.
    pub event_log: EventLogRef,
}

impl AuditManifest {
    /// Computes the canonical digest of this manifest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn canonical_hash(&self) -> Result<Sha256Digest, HashError> {
        Sha256Digest::of_canonical_json(self)
    }

    /// Returns the entry for a path, when present.
    #[must_use]
    pub fn entry(&self, path: &str) -> Option<&ManifestEntry> {
        self.artifacts.iter().find(|entry| entry.path == path)
    }
}
