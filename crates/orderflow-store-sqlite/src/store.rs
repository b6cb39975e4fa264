// crates/orderflow-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store
// Description: WAL-mode SQLite backing for the Orderflow storage interfaces.
// Purpose: Persist cases, events, fingerprints, and cache entries durably.
// Dependencies: orderflow-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Case snapshots are stored as canonical JSON with their digest and verified
//! on load. Event appends run in a transaction that checks the next dense
//! sequence, so a gap can never be committed. Fingerprint registration is
//! `INSERT OR IGNORE` followed by a read-back inside one transaction, which
//! is what makes it first-writer-wins under concurrency. The schema version
//! lives in `user_version`; an unknown version fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use orderflow_core::AuditEvent;
use orderflow_core::CachedCandidates;
use orderflow_core::CaseId;
use orderflow_core::CaseState;
use orderflow_core::CaseStore;
use orderflow_core::CaseStoreError;
use orderflow_core::DraftId;
use orderflow_core::EventLog;
use orderflow_core::EventLogError;
use orderflow_core::FingerprintMetadata;
use orderflow_core::FingerprintStore;
use orderflow_core::FingerprintStoreError;
use orderflow_core::MatchCache;
use orderflow_core::MatchCacheError;
use orderflow_core::Sha256Digest;
use orderflow_core::canonical_json_bytes;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version stamped into `user_version`.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// SQLite store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteStoreConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a config for the given database path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store construction and migration errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Database could not be opened.
    #[error("sqlite open failed: {0}")]
    Open(String),
    /// Stored schema version is unknown.
    #[error("sqlite schema version {found} is not supported (expected {expected})")]
    SchemaVersion {
        /// Version found in the database.
        found: i64,
        /// Version this build supports.
        expected: i64,
    },
    /// Migration statement failed.
    #[error("sqlite migration failed: {0}")]
    Migration(String),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// WAL-mode SQLite store implementing the four storage interfaces.
pub struct SqliteStore {
    /// Serialized connection; SQLite handles cross-process locking, this
    /// mutex serializes in-process writers.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (and migrates) the database at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the file cannot be opened, the
    /// schema version is unknown, or migration fails.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(&config.path)
            .map_err(|err| SqliteStoreError::Open(err.to_string()))?;
        conn.pragma_update(None, "journal_mode", "wal")
            .map_err(|err| SqliteStoreError::Open(err.to_string()))?;
        conn.pragma_update(None, "synchronous", "full")
            .map_err(|err| SqliteStoreError::Open(err.to_string()))?;
        conn.pragma_update(None, "busy_timeout", i64::try_from(config.busy_timeout_ms).unwrap_or(i64::MAX))
            .map_err(|err| SqliteStoreError::Open(err.to_string()))?;

        let found: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|err| SqliteStoreError::Open(err.to_string()))?;
        match found {
            0 => migrate(&conn)?,
            SCHEMA_VERSION => {}
            other => {
                return Err(SqliteStoreError::SchemaVersion {
                    found: other,
                    expected: SCHEMA_VERSION,
                });
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Locks the connection, absorbing poison.
    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates the schema and stamps the version.
fn migrate(conn: &Connection) -> Result<(), SqliteStoreError> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS cases (
             case_id     TEXT PRIMARY KEY,
             snapshot    TEXT NOT NULL,
             snapshot_sha TEXT NOT NULL,
             updated_at  INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS events (
             case_id TEXT NOT NULL,
             seq     INTEGER NOT NULL,
             record  TEXT NOT NULL,
             PRIMARY KEY (case_id, seq)
         );
         CREATE TABLE IF NOT EXISTS fingerprints (
             fingerprint TEXT PRIMARY KEY,
             draft_id    TEXT NOT NULL,
             metadata    TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS match_cache (
             key     TEXT PRIMARY KEY,
             payload TEXT NOT NULL
         );
         PRAGMA user_version = 1;
         COMMIT;",
    )
    .map_err(|err| SqliteStoreError::Migration(err.to_string()))
}

// ============================================================================
// SECTION: Case Store
// ============================================================================

impl CaseStore for SqliteStore {
    fn load(&self, case_id: &CaseId) -> Result<Option<CaseState>, CaseStoreError> {
        let conn = self.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT snapshot, snapshot_sha FROM cases WHERE case_id = ?1",
                params![case_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| CaseStoreError::Unavailable(err.to_string()))?;

        let Some((snapshot, stored_sha)) = row else {
            return Ok(None);
        };
        let actual = Sha256Digest::of_bytes(snapshot.as_bytes());
        if actual.as_str() != stored_sha {
            return Err(CaseStoreError::Corrupt(format!(
                "snapshot digest mismatch for case {case_id}"
            )));
        }
        let state: CaseState = serde_json::from_str(&snapshot)
            .map_err(|err| CaseStoreError::Corrupt(err.to_string()))?;
        Ok(Some(state))
    }

    fn save(&self, state: &CaseState) -> Result<(), CaseStoreError> {
        let bytes = canonical_json_bytes(state)
            .map_err(|err| CaseStoreError::Corrupt(err.to_string()))?;
        let snapshot = String::from_utf8(bytes)
            .map_err(|err| CaseStoreError::Corrupt(err.to_string()))?;
        let sha = Sha256Digest::of_bytes(snapshot.as_bytes());
        let conn = self.lock();
        conn.execute(
            "INSERT INTO cases (case_id, snapshot, snapshot_sha, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(case_id) DO UPDATE SET
                 snapshot = excluded.snapshot,
                 snapshot_sha = excluded.snapshot_sha,
                 updated_at = excluded.updated_at",
            params![
                state.case_id.as_str(),
                snapshot,
                sha.as_str(),
                state.updated_at.as_millis()
            ],
        )
        .map_err(|err| CaseStoreError::Unavailable(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

impl EventLog for SqliteStore {
    fn append(&self, event: &AuditEvent) -> Result<(), EventLogError> {
        let record = serde_json::to_string(event)
            .map_err(|err| EventLogError::Unavailable(err.to_string()))?;
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|err| EventLogError::Unavailable(err.to_string()))?;
        let next: u64 = tx
            .query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE case_id = ?1",
                params![event.case_id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|err| EventLogError::Unavailable(err.to_string()))?
            .unsigned_abs();
        if event.seq != next {
            return Err(EventLogError::SequenceViolation {
                case_id: event.case_id.clone(),
                expected: next,
                got: event.seq,
            });
        }
        tx.execute(
            "INSERT INTO events (case_id, seq, record) VALUES (?1, ?2, ?3)",
            params![
                event.case_id.as_str(),
                i64::try_from(event.seq).unwrap_or(i64::MAX),
                record
            ],
        )
        .map_err(|err| EventLogError::Unavailable(err.to_string()))?;
        tx.commit().map_err(|err| EventLogError::Unavailable(err.to_string()))
    }

    fn read_by_case(
        &self,
        case_id: &CaseId,
        from_seq: u64,
    ) -> Result<Vec<AuditEvent>, EventLogError> {
        let conn = self.lock();
        let mut statement = conn
            .prepare(
                "SELECT record FROM events WHERE case_id = ?1 AND seq >= ?2 ORDER BY seq ASC",
            )
            .map_err(|err| EventLogError::Unavailable(err.to_string()))?;
        let rows = statement
            .query_map(
                params![case_id.as_str(), i64::try_from(from_seq).unwrap_or(i64::MAX)],
                |row| row.get::<_, String>(0),
            )
            .map_err(|err| EventLogError::Unavailable(err.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            let record = row.map_err(|err| EventLogError::Unavailable(err.to_string()))?;
            let event: AuditEvent = serde_json::from_str(&record)
                .map_err(|_| EventLogError::Corrupt(case_id.clone()))?;
            events.push(event);
        }
        Ok(events)
    }
}

// ============================================================================
// SECTION: Fingerprint Store
// ============================================================================

impl FingerprintStore for SqliteStore {
    fn lookup(&self, fingerprint: &Sha256Digest) -> Result<Option<DraftId>, FingerprintStoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT draft_id FROM fingerprints WHERE fingerprint = ?1",
            params![fingerprint.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|err| FingerprintStoreError::Unavailable(err.to_string()))
        .map(|row| row.map(DraftId::new))
    }

    fn register(
        &self,
        fingerprint: &Sha256Digest,
        draft_id: &DraftId,
        metadata: &FingerprintMetadata,
    ) -> Result<DraftId, FingerprintStoreError> {
        let metadata = serde_json::to_string(metadata)
            .map_err(|err| FingerprintStoreError::Unavailable(err.to_string()))?;
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|err| FingerprintStoreError::Unavailable(err.to_string()))?;
        tx.execute(
            "INSERT OR IGNORE INTO fingerprints (fingerprint, draft_id, metadata)
             VALUES (?1, ?2, ?3)",
            params![fingerprint.as_str(), draft_id.as_str(), metadata],
        )
        .map_err(|err| FingerprintStoreError::Unavailable(err.to_string()))?;
        let winner: String = tx
            .query_row(
                "SELECT draft_id FROM fingerprints WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| FingerprintStoreError::Unavailable(err.to_string()))?;
        tx.commit().map_err(|err| FingerprintStoreError::Unavailable(err.to_string()))?;
        Ok(DraftId::new(winner))
    }
}

// ============================================================================
// SECTION: Match Cache
// ============================================================================

impl MatchCache for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<CachedCandidates>, MatchCacheError> {
        let conn = self.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM match_cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| MatchCacheError::Unavailable(err.to_string()))?;
        payload
            .map(|text| {
                serde_json::from_str(&text)
                    .map_err(|err| MatchCacheError::Unavailable(err.to_string()))
            })
            .transpose()
    }

    fn put(&self, key: &str, record: &CachedCandidates) -> Result<(), MatchCacheError> {
        let payload = serde_json::to_string(record)
            .map_err(|err| MatchCacheError::Unavailable(err.to_string()))?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO match_cache (key, payload) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload",
            params![key, payload],
        )
        .map_err(|err| MatchCacheError::Unavailable(err.to_string()))?;
        Ok(())
    }
}
