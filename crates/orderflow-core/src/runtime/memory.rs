// crates/orderflow-core/src/runtime/memory.rs
// ============================================================================
// Module: Orderflow In-Memory Stores
// Description: Reference implementations of the storage interfaces.
// Purpose: Back tests and the minimal composition without external services.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! In-memory stores implement the full storage contracts, including the
//! event log's dense-sequence enforcement and the fingerprint registry's
//! first-writer-wins semantics, so engine tests exercise the same invariants
//! the durable backends enforce. Nothing here survives a process restart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use crate::core::Sha256Digest;
use crate::core::case::CaseState;
use crate::core::events::AuditEvent;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::DraftId;
use crate::interfaces::CachedCandidates;
use crate::interfaces::CaseStore;
use crate::interfaces::CaseStoreError;
use crate::interfaces::EventLog;
use crate::interfaces::EventLogError;
use crate::interfaces::EvidenceStore;
use crate::interfaces::EvidenceStoreError;
use crate::interfaces::FingerprintMetadata;
use crate::interfaces::FingerprintStore;
use crate::interfaces::FingerprintStoreError;
use crate::interfaces::MatchCache;
use crate::interfaces::MatchCacheError;

// ============================================================================
// SECTION: Evidence Store
// ============================================================================

/// In-memory content-addressed blob store.
#[derive(Debug, Default)]
pub struct InMemoryEvidenceStore {
    /// Blob content by path.
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryEvidenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored path, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<Sha256Digest, EvidenceStoreError> {
        if path.is_empty() || path.contains("..") {
            return Err(EvidenceStoreError::InvalidPath(path.to_string()));
        }
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = blobs.get(path)
            && existing != bytes
        {
            return Err(EvidenceStoreError::Immutable(path.to_string()));
        }
        blobs.insert(path.to_string(), bytes.to_vec());
        Ok(Sha256Digest::of_bytes(bytes))
    }

    fn put_append(&self, path: &str, record: &str) -> Result<(), EvidenceStoreError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = blobs.entry(path.to_string()).or_default();
        entry.extend_from_slice(record.as_bytes());
        entry.push(b'\n');
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, EvidenceStoreError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| EvidenceStoreError::NotFound(path.to_string()))
    }

    fn presign_read(
        &self,
        path: &str,
        ttl: Duration,
        _allowed_roles: &[String],
    ) -> Result<String, EvidenceStoreError> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        if blobs.contains_key(path) {
            Ok(format!("memory://{path}?ttl={}", ttl.as_secs()))
        } else {
            Err(EvidenceStoreError::NotFound(path.to_string()))
        }
    }
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// In-memory append-only event log with dense-sequence enforcement.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    /// Events per case, in append order.
    streams: Mutex<BTreeMap<CaseId, Vec<AuditEvent>>>,
}

impl InMemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, event: &AuditEvent) -> Result<(), EventLogError> {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = streams.entry(event.case_id.clone()).or_default();
        let expected = u64::try_from(stream.len()).unwrap_or(u64::MAX) + 1;
        if event.seq != expected {
            return Err(EventLogError::SequenceViolation {
                case_id: event.case_id.clone(),
                expected,
                got: event.seq,
            });
        }
        stream.push(event.clone());
        Ok(())
    }

    fn read_by_case(
        &self,
        case_id: &CaseId,
        from_seq: u64,
    ) -> Result<Vec<AuditEvent>, EventLogError> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(streams
            .get(case_id)
            .map(|stream| {
                stream.iter().filter(|event| event.seq >= from_seq).cloned().collect()
            })
            .unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Case Store
// ============================================================================

/// In-memory case store.
#[derive(Debug, Default)]
pub struct InMemoryCaseStore {
    /// Case snapshots by id.
    cases: Mutex<BTreeMap<CaseId, CaseState>>,
}

impl InMemoryCaseStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaseStore for InMemoryCaseStore {
    fn load(&self, case_id: &CaseId) -> Result<Option<CaseState>, CaseStoreError> {
        Ok(self.cases.lock().unwrap_or_else(PoisonError::into_inner).get(case_id).cloned())
    }

    fn save(&self, state: &CaseState) -> Result<(), CaseStoreError> {
        self.cases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.case_id.clone(), state.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Fingerprint Store
// ============================================================================

/// In-memory fingerprint registry with first-writer-wins registration.
#[derive(Debug, Default)]
pub struct InMemoryFingerprintStore {
    /// Registered draft ids by fingerprint.
    entries: Mutex<BTreeMap<Sha256Digest, (DraftId, FingerprintMetadata)>>,
}

impl InMemoryFingerprintStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for InMemoryFingerprintStore {
    fn lookup(&self, fingerprint: &Sha256Digest) -> Result<Option<DraftId>, FingerprintStoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .map(|(draft_id, _)| draft_id.clone()))
    }

    fn register(
        &self,
        fingerprint: &Sha256Digest,
        draft_id: &DraftId,
        metadata: &FingerprintMetadata,
    ) -> Result<DraftId, FingerprintStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let (winner, _) = entries
            .entry(fingerprint.clone())
            .or_insert_with(|| (draft_id.clone(), metadata.clone()));
        Ok(winner.clone())
    }
}

// ============================================================================
// SECTION: Match Cache
// ============================================================================

/// In-memory durable-tier match cache.
#[derive(Debug, Default)]
pub struct InMemoryMatchCache {
    /// Cached payloads by key.
    entries: Mutex<BTreeMap<String, CachedCandidates>>,
}

impl InMemoryMatchCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchCache for InMemoryMatchCache {
    fn get(&self, key: &str) -> Result<Option<CachedCandidates>, MatchCacheError> {
        Ok(self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn put(&self, key: &str, record: &CachedCandidates) -> Result<(), MatchCacheError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), record.clone());
        Ok(())
    }
}
