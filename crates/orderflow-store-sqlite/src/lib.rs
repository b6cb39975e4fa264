// crates/orderflow-store-sqlite/src/lib.rs
// ============================================================================
// Module: Orderflow SQLite Store Library
// Description: Durable case, event, fingerprint, and cache storage.
// Purpose: Back the storage interfaces with one WAL-mode SQLite database.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! One SQLite database in WAL mode backs four interfaces: integrity-hashed
//! case snapshots, the append-only event log with dense per-case sequences
//! enforced in the insert transaction, the linearizable first-writer-wins
//! fingerprint registry, and the durable match-cache tier. Loads verify
//! stored hashes and fail closed on corruption.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
