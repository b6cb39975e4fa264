// crates/orderflow-store-sqlite/tests/store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Durability, integrity, density, and first-writer-wins checks.
// Purpose: Validate the storage invariants against a real database file.
// Dependencies: orderflow-store-sqlite, tempfile
// ============================================================================
//! ## Overview
//! Case snapshots round-trip across a reopen and fail closed on tampering;
//! event appends enforce the dense sequence inside the insert transaction;
//! fingerprint registration is first-writer-wins; cache entries round-trip.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use orderflow_core::Actor;
use orderflow_core::AuditEvent;
use orderflow_core::CachedCandidates;
use orderflow_core::CaseId;
use orderflow_core::CaseState;
use orderflow_core::CaseStatus;
use orderflow_core::CaseStore;
use orderflow_core::CaseStoreError;
use orderflow_core::ChatThreadId;
use orderflow_core::CorrelationId;
use orderflow_core::DraftId;
use orderflow_core::EventLog;
use orderflow_core::EventLogError;
use orderflow_core::EventType;
use orderflow_core::FingerprintMetadata;
use orderflow_core::FingerprintStore;
use orderflow_core::MatchCache;
use orderflow_core::Sha256Digest;
use orderflow_core::TenantId;
use orderflow_core::Timestamp;
use orderflow_core::UserId;
use orderflow_store_sqlite::SqliteStore;
use orderflow_store_sqlite::SqliteStoreConfig;

/// Builds a minimal case snapshot.
fn sample_case(case_id: &str) -> CaseState {
    CaseState {
        case_id: CaseId::new(case_id),
        tenant_id: TenantId::new("t-1"),
        user_id: UserId::new("u-1"),
        chat_thread: ChatThreadId::new("thread-1"),
        correlation_id: CorrelationId::new("corr-1"),
        status: CaseStatus::Parsing,
        created_at: Timestamp::Logical(1),
        updated_at: Timestamp::Logical(2),
        execution: 1,
        blob_uri: "uploads/x.xlsx".to_string(),
        file_sha256: None,
        awaiting_reupload: None,
        order_version: 0,
        order_paths: Vec::new(),
        columns: Vec::new(),
        language: None,
        pinned: BTreeMap::new(),
        verdict: None,
        verdict_round: 0,
        resolved_customer: None,
        resolved_lines: Vec::new(),
        pending: None,
        approval: None,
        fingerprint: None,
        external_draft_id: None,
        draft_number: None,
        draft_duplicate: false,
        failure: None,
        next_seq: 3,
        bundle_hash: None,
    }
}

/// Builds an event for the given case and sequence.
fn event(case: &str, seq: u64) -> AuditEvent {
    AuditEvent {
        seq,
        ts: Timestamp::Logical(seq),
        case_id: CaseId::new(case),
        tenant_id: TenantId::new("t-1"),
        event_type: EventType::FileStored,
        actor: Actor::System,
        correlation: None,
        data: None,
        pointers: Vec::new(),
        redactions: Vec::new(),
    }
}

/// Verifies snapshots survive a close-and-reopen cycle.
#[test]
fn snapshot_round_trips_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteStoreConfig::new(dir.path().join("orderflow.db"));

    {
        let store = SqliteStore::open(&config).unwrap();
        store.save(&sample_case("C1")).unwrap();
    }

    let store = SqliteStore::open(&config).unwrap();
    let loaded = store.load(&CaseId::new("C1")).unwrap().unwrap();
    assert_eq!(loaded, sample_case("C1"));
    assert!(store.load(&CaseId::new("missing")).unwrap().is_none());
}

/// Verifies a tampered snapshot fails closed.
#[test]
fn tampered_snapshot_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteStoreConfig::new(dir.path().join("orderflow.db"));
    let store = SqliteStore::open(&config).unwrap();
    store.save(&sample_case("C1")).unwrap();
    drop(store);

    // Flip a byte directly in the snapshot column.
    let conn = rusqlite::Connection::open(dir.path().join("orderflow.db")).unwrap();
    conn.execute(
        "UPDATE cases SET snapshot = replace(snapshot, 'parsing', 'failed') WHERE case_id = 'C1'",
        [],
    )
    .unwrap();
    drop(conn);

    let store = SqliteStore::open(&config).unwrap();
    assert!(matches!(store.load(&CaseId::new("C1")), Err(CaseStoreError::Corrupt(_))));
}

/// Verifies event appends enforce the dense sequence.
#[test]
fn event_appends_are_dense() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&SqliteStoreConfig::new(dir.path().join("db"))).unwrap();

    store.append(&event("C1", 1)).unwrap();
    store.append(&event("C1", 2)).unwrap();
    let error = store.append(&event("C1", 4)).unwrap_err();
    assert!(matches!(error, EventLogError::SequenceViolation { expected: 3, got: 4, .. }));
    // Replays of an already-appended sequence are rejected too.
    assert!(store.append(&event("C1", 2)).is_err());

    // Independent case streams start at 1.
    store.append(&event("C2", 1)).unwrap();

    let events = store.read_by_case(&CaseId::new("C1"), 1).unwrap();
    assert_eq!(events.len(), 2);
    let tail = store.read_by_case(&CaseId::new("C1"), 2).unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].seq, 2);
}

/// Verifies fingerprint registration is first-writer-wins.
#[test]
fn fingerprint_registration_first_writer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&SqliteStoreConfig::new(dir.path().join("db"))).unwrap();
    let fingerprint = Sha256Digest::of_bytes(b"order");
    let metadata = FingerprintMetadata {
        case_id: CaseId::new("C1"),
        tenant_id: TenantId::new("t-1"),
        registered_at: Timestamp::Logical(1),
    };

    let winner = store.register(&fingerprint, &DraftId::new("draft-1"), &metadata).unwrap();
    assert_eq!(winner, DraftId::new("draft-1"));

    // A competing registration reads back the original winner.
    let loser = store.register(&fingerprint, &DraftId::new("draft-2"), &metadata).unwrap();
    assert_eq!(loser, DraftId::new("draft-1"));

    assert_eq!(store.lookup(&fingerprint).unwrap(), Some(DraftId::new("draft-1")));
    assert_eq!(store.lookup(&Sha256Digest::of_bytes(b"other")).unwrap(), None);
}

/// Verifies cache entries round-trip and overwrite.
#[test]
fn match_cache_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&SqliteStoreConfig::new(dir.path().join("db"))).unwrap();

    let entry = CachedCandidates {
        payload: serde_json::json!([{ "id": "c-1" }]),
        cached_at: Timestamp::Logical(5),
    };
    store.put("t/customer/acme", &entry).unwrap();
    assert_eq!(store.get("t/customer/acme").unwrap(), Some(entry.clone()));

    let newer = CachedCandidates {
        payload: serde_json::json!([]),
        cached_at: Timestamp::Logical(9),
    };
    store.put("t/customer/acme", &newer).unwrap();
    assert_eq!(store.get("t/customer/acme").unwrap(), Some(newer));
    assert_eq!(store.get("missing").unwrap(), None);
}
