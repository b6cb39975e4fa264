// crates/orderflow-evidence-fs/tests/fs_store.rs
// ============================================================================
// Module: Filesystem Evidence Store Tests
// Description: Write-once semantics, layout, appends, and presign tokens.
// Purpose: Validate the evidence contract over a real directory tree.
// Dependencies: orderflow-evidence-fs, tempfile
// ============================================================================
//! ## Overview
//! Blobs round-trip with matching digests, rewrites with different bytes
//! fail closed, traversal paths are rejected, JSONL appends accumulate, and
//! presign capabilities verify until expiry and fail on tampering.

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

use std::time::Duration;

use orderflow_core::EvidenceStore;
use orderflow_core::EvidenceStoreError;
use orderflow_core::Sha256Digest;
use orderflow_evidence_fs::FsEvidenceStore;
use orderflow_evidence_fs::PresignToken;

/// Verifies blobs round-trip with their digest.
#[test]
fn put_and_get_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEvidenceStore::new(dir.path()).unwrap();

    let digest = store.put("C1/original.xlsx", b"workbook bytes").unwrap();
    assert_eq!(digest, Sha256Digest::of_bytes(b"workbook bytes"));
    assert_eq!(store.get("C1/original.xlsx").unwrap(), b"workbook bytes");

    // Nested layout paths create their directories.
    store.put("C1/committee/r1/alpha-1/response.json", b"{}").unwrap();
    assert_eq!(store.get("C1/committee/r1/alpha-1/response.json").unwrap(), b"{}");
}

/// Verifies identical rewrites are idempotent and differing ones fail.
#[test]
fn rewrite_with_different_bytes_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEvidenceStore::new(dir.path()).unwrap();

    store.put("C1/canonical/v1.json", b"{\"v\":1}").unwrap();
    store.put("C1/canonical/v1.json", b"{\"v\":1}").unwrap();
    let error = store.put("C1/canonical/v1.json", b"{\"v\":2}").unwrap_err();
    assert!(matches!(error, EvidenceStoreError::Immutable(_)));
}

/// Verifies traversal and absolute paths are rejected.
#[test]
fn traversal_paths_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEvidenceStore::new(dir.path()).unwrap();

    assert!(matches!(
        store.put("../escape.bin", b"x"),
        Err(EvidenceStoreError::InvalidPath(_))
    ));
    assert!(matches!(
        store.put("/etc/passwd", b"x"),
        Err(EvidenceStoreError::InvalidPath(_))
    ));
    assert!(matches!(
        store.get("C1/../../secret"),
        Err(EvidenceStoreError::InvalidPath(_))
    ));
}

/// Verifies JSONL appends accumulate line by line.
#[test]
fn appends_accumulate_lines() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEvidenceStore::new(dir.path()).unwrap();

    store.put_append("logs/2026/08/01/C1.jsonl", "{\"seq\":1}").unwrap();
    store.put_append("logs/2026/08/01/C1.jsonl", "{\"seq\":2}").unwrap();
    let content = String::from_utf8(store.get("logs/2026/08/01/C1.jsonl").unwrap()).unwrap();
    assert_eq!(content, "{\"seq\":1}\n{\"seq\":2}\n");
}

/// Verifies missing paths read as not found.
#[test]
fn missing_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEvidenceStore::new(dir.path()).unwrap();
    assert!(matches!(
        store.get("C1/missing.json"),
        Err(EvidenceStoreError::NotFound(_))
    ));
}

/// Parses a presign URL back into its capability parts.
fn parse_presign(url: &str) -> PresignToken {
    let (path, query) = url.split_once('?').unwrap();
    let mut expires = 0;
    let mut roles = Vec::new();
    let mut token = String::new();
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap();
        match key {
            "expires" => expires = value.parse().unwrap(),
            "roles" => {
                roles = value.split(',').map(ToString::to_string).collect();
            }
            "token" => token = value.to_string(),
            _ => panic!("unexpected presign key {key}"),
        }
    }
    PresignToken {
        path: path.to_string(),
        expires,
        roles,
        token,
    }
}

/// Verifies presign capabilities verify until expiry and fail on tampering.
#[test]
fn presign_tokens_verify_and_expire() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsEvidenceStore::new(dir.path()).unwrap();
    store.put("C1/audit/manifest.json", b"{}").unwrap();

    let url = store
        .presign_read(
            "C1/audit/manifest.json",
            Duration::from_secs(600),
            &["auditor".to_string()],
        )
        .unwrap();
    let capability = parse_presign(&url);

    assert!(store.verify_presign(&capability, capability.expires - 1));
    // Past expiry the capability is dead.
    assert!(!store.verify_presign(&capability, capability.expires + 1));

    // A tampered path fails verification.
    let mut forged = capability.clone();
    forged.path = "C1/original.xlsx".to_string();
    assert!(!store.verify_presign(&forged, forged.expires - 1));

    // Presigning a missing path fails.
    assert!(store
        .presign_read("C1/missing.json", Duration::from_secs(60), &[])
        .is_err());
}
