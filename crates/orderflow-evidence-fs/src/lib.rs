// crates/orderflow-evidence-fs/src/lib.rs
// ============================================================================
// Module: Orderflow Filesystem Evidence Store
// Description: Content-addressed blob store over a root directory.
// Purpose: Durable, write-once artifact storage with the case path layout.
// Dependencies: crate::fs
// ============================================================================

//! ## Overview
//! The filesystem backend maps evidence paths directly under a root
//! directory: `<case_id>/original.xlsx`, `<case_id>/canonical/v<n>.json`,
//! committee artifacts per round and provider, `<case_id>/audit/manifest.json`,
//! and daily JSONL logs under `logs/`. Writes are write-once (a differing
//! rewrite fails closed), audit paths are additionally made read-only on
//! disk, and presigned reads are HMAC-style capability tokens checked by the
//! serving layer.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod fs;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use fs::FsEvidenceStore;
pub use fs::PresignToken;
