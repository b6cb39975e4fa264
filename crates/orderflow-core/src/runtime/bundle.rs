// crates/orderflow-core/src/runtime/bundle.rs
// ============================================================================
// Module: Orderflow Audit Bundle Runtime
// Description: Bundle sealing at terminal status and offline verification.
// Purpose: Guarantee every outcome produces an independently checkable bundle.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Sealing walks the case's event stream, collects every artifact pointer,
//! writes the JSONL excerpt as a write-once audit blob (mirrored to the
//! daily log path), and persists the sorted manifest at
//! `<case_id>/audit/manifest.json`. Verification re-reads a sealed manifest
//! and fails closed on any missing artifact, digest mismatch, or sequence
//! gap in the excerpt. Both directions run offline against an evidence store
//! alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::AuditManifest;
use crate::core::CaseStatus;
use crate::core::EventLogRef;
use crate::core::ManifestEntry;
use crate::core::Sha256Digest;
use crate::core::Timestamp;
use crate::core::events::BlobPointer;
use crate::core::hashing::HashError;
use crate::core::identifiers::CaseId;
use crate::interfaces::EventLog;
use crate::interfaces::EventLogError;
use crate::interfaces::EvidenceStore;
use crate::interfaces::EvidenceStoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while sealing or verifying a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Evidence store failure.
    #[error(transparent)]
    Evidence(#[from] EvidenceStoreError),
    /// Event log failure.
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    /// Canonicalization failure.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Manifest or event serialization failure.
    #[error("bundle serialization failed: {0}")]
    Serialization(String),
}

// ============================================================================
// SECTION: Sealing
// ============================================================================

/// Returns the daily JSONL excerpt path for a case.
#[must_use]
pub fn excerpt_path(case_id: &CaseId, finalized_at: Timestamp) -> String {
    let rendered = finalized_at.to_rfc3339();
    // RFC 3339 always leads with yyyy-mm-dd.
    let year = rendered.get(0..4).unwrap_or("0000");
    let month = rendered.get(5..7).unwrap_or("00");
    let day = rendered.get(8..10).unwrap_or("00");
    format!("logs/{year}/{month}/{day}/{case_id}.jsonl")
}

/// Seals the audit bundle for a case.
///
/// Collects artifact pointers from the event stream, writes the JSONL
/// excerpt, persists the manifest, and returns it with its digest. Sealing is
/// idempotent for a given event stream because the manifest content is
/// deterministic.
///
/// # Errors
///
/// Returns [`BundleError`] when the stream cannot be read or an artifact
/// cannot be persisted.
pub fn seal_bundle(
    evidence: &dyn EvidenceStore,
    events: &dyn EventLog,
    case_id: &CaseId,
    final_status: CaseStatus,
    finalized_at: Timestamp,
) -> Result<(AuditManifest, Sha256Digest, String), BundleError> {
    let stream = events.read_by_case(case_id, 1)?;

    let mut artifacts: BTreeMap<String, Sha256Digest> = BTreeMap::new();
    for event in &stream {
        for pointer in &event.pointers {
            artifacts.insert(pointer.path.clone(), pointer.sha256.clone());
        }
    }

    let mut excerpt = String::new();
    for event in &stream {
        let line = event.to_jsonl().map_err(|err| BundleError::Serialization(err.to_string()))?;
        excerpt.push_str(&line);
        excerpt.push('\n');
    }
    let last_seq = stream.last().map_or(0, |event| event.seq);
    // The excerpt blob is unique per seal (the sequence grows between
    // seals), so write-once never conflicts; the daily log is an
    // operational mirror outside the manifest.
    let log_path = format!("{case_id}/audit/events.{last_seq}.jsonl");
    let excerpt_sha256 = evidence.put(&log_path, excerpt.as_bytes())?;
    evidence.put_append(&excerpt_path(case_id, finalized_at), excerpt.trim_end())?;

    let manifest = AuditManifest {
        case_id: case_id.clone(),
        final_status,
        finalized_at,
        artifacts: artifacts
            .into_iter()
            .map(|(path, sha256)| ManifestEntry {
                path,
                sha256,
            })
            .collect(),
        event_log: EventLogRef::Pointer {
            pointer: BlobPointer {
                path: log_path,
                sha256: excerpt_sha256,
            },
        },
    };

    let manifest_bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|err| BundleError::Serialization(err.to_string()))?;
    let manifest_path = format!("{case_id}/audit/manifest.json");
    let manifest_path = match evidence.put(&manifest_path, &manifest_bytes) {
        Ok(_) => manifest_path,
        // A case sealed once already (queued, then terminated): the original
        // manifest stands and the superseding one is written alongside.
        Err(EvidenceStoreError::Immutable(_)) => {
            let superseding = format!("{case_id}/audit/manifest.{last_seq}.json");
            evidence.put(&superseding, &manifest_bytes)?;
            superseding
        }
        Err(err) => return Err(err.into()),
    };
    let manifest_hash = manifest.canonical_hash()?;

    Ok((manifest, manifest_hash, manifest_path))
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Outcome of one offline bundle verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Number of artifacts checked.
    pub checked: usize,
    /// Failures found; empty means the bundle verified.
    pub failures: Vec<String>,
}

impl VerificationReport {
    /// Returns true when no failure was found.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Verifies a sealed bundle against the evidence store.
///
/// Every referenced artifact is re-read and re-hashed; the event-log excerpt
/// is checked for digest match and dense sequence numbering.
///
/// # Errors
///
/// Returns [`BundleError`] when the manifest itself cannot be read or
/// parsed; individual artifact failures land in the report instead.
pub fn verify_bundle(
    evidence: &dyn EvidenceStore,
    case_id: &CaseId,
) -> Result<VerificationReport, BundleError> {
    let manifest_path = format!("{case_id}/audit/manifest.json");
    let manifest_bytes = evidence.get(&manifest_path)?;
    let manifest: AuditManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|err| BundleError::Serialization(err.to_string()))?;

    let mut failures = Vec::new();
    let mut checked = 0_usize;

    for entry in &manifest.artifacts {
        checked += 1;
        match evidence.get(&entry.path) {
            Ok(bytes) => {
                let digest = Sha256Digest::of_bytes(&bytes);
                if digest != entry.sha256 {
                    failures.push(format!(
                        "digest mismatch at {}: manifest {}, stored {}",
                        entry.path, entry.sha256, digest
                    ));
                }
            }
            Err(err) => failures.push(format!("missing artifact {}: {err}", entry.path)),
        }
    }

    let seqs: Vec<u64> = match &manifest.event_log {
        EventLogRef::Inline { events } => events.iter().map(|event| event.seq).collect(),
        EventLogRef::Pointer { pointer } => {
            checked += 1;
            match evidence.get(&pointer.path) {
                Ok(bytes) => {
                    let digest = Sha256Digest::of_bytes(&bytes);
                    if digest != pointer.sha256 {
                        failures.push(format!(
                            "digest mismatch at {}: manifest {}, stored {}",
                            pointer.path, pointer.sha256, digest
                        ));
                    }
                    excerpt_sequences(&bytes, &mut failures)
                }
                Err(err) => {
                    failures.push(format!("missing event excerpt {}: {err}", pointer.path));
                    Vec::new()
                }
            }
        }
    };

    let mut expected = 1_u64;
    for seq in &seqs {
        if *seq != expected {
            failures.push(format!("event sequence gap: expected {expected}, got {seq}"));
            break;
        }
        expected += 1;
    }

    Ok(VerificationReport {
        checked,
        failures,
    })
}

/// Extracts sequence numbers from the JSONL excerpt.
///
/// Excerpt lines carry the rendered RFC 3339 `ts`, so they are read as
/// generic JSON rather than round-tripped through [`AuditEvent`].
fn excerpt_sequences(bytes: &[u8], failures: &mut Vec<String>) -> Vec<u64> {
    let text = String::from_utf8_lossy(bytes);
    let mut seqs = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => match value.get("seq").and_then(serde_json::Value::as_u64) {
                Some(seq) => seqs.push(seq),
                None => failures.push(format!("excerpt line {} lacks a seq key", index + 1)),
            },
            Err(err) => failures.push(format!("malformed excerpt line {}: {err}", index + 1)),
        }
    }
    seqs
}
