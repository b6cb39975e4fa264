// crates/orderflow-core/src/interfaces/mod.rs
// ============================================================================
// Module: Orderflow Interfaces
// Description: Backend-agnostic interfaces for storage, catalog, and review.
// Purpose: Define the contract surfaces the workflow engine drives.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the engine integrates with storage backends, the
//! external catalog, committee model providers, the parser, and the
//! notification surface without embedding backend detail. Implementations
//! must be deterministic in their success results and fail closed on missing
//! or invalid data. All traits are `Send + Sync` because activities run on a
//! shared worker pool.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::CanonicalOrder;
use crate::core::ColumnCandidate;
use crate::core::EngineError;
use crate::core::Money;
use crate::core::Sha256Digest;
use crate::core::Timestamp;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::ChatThreadId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::CustomerId;
use crate::core::identifiers::DraftId;
use crate::core::identifiers::ItemId;
use crate::core::identifiers::ProviderFamily;
use crate::core::identifiers::ProviderId;
use crate::core::identifiers::TenantId;
use crate::core::case::CaseState;
use crate::core::events::AuditEvent;
use crate::core::order::BlockedReason;

// ============================================================================
// SECTION: Evidence Store
// ============================================================================

/// Evidence store errors.
#[derive(Debug, Error)]
pub enum EvidenceStoreError {
    /// Underlying storage unavailable.
    #[error("evidence store unavailable: {0}")]
    Unavailable(String),
    /// Path not present in the store.
    #[error("evidence path not found: {0}")]
    NotFound(String),
    /// Write rejected by the write-once policy.
    #[error("evidence path is immutable: {0}")]
    Immutable(String),
    /// Path is malformed or escapes the store root.
    #[error("invalid evidence path: {0}")]
    InvalidPath(String),
}

/// Content-addressed, append-only blob container.
///
/// Paths follow the deterministic case layout (`<case_id>/original.xlsx`,
/// `<case_id>/canonical/v<n>.json`, ...). Stored artifacts are never
/// mutated; corrections produce new paths.
pub trait EvidenceStore: Send + Sync {
    /// Stores bytes at a path, returning the content digest.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceStoreError`] when the write fails or the path is
    /// already sealed by the write-once policy.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<Sha256Digest, EvidenceStoreError>;

    /// Appends one record line to a JSONL path.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceStoreError`] when the append fails.
    fn put_append(&self, path: &str, record: &str) -> Result<(), EvidenceStoreError>;

    /// Reads stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceStoreError::NotFound`] when the path is absent.
    fn get(&self, path: &str) -> Result<Vec<u8>, EvidenceStoreError>;

    /// Issues a time-limited read capability for the path.
    ///
    /// # Errors
    ///
    /// Returns [`EvidenceStoreError`] when the path is absent or the
    /// capability cannot be issued.
    fn presign_read(
        &self,
        path: &str,
        ttl: Duration,
        allowed_roles: &[String],
    ) -> Result<String, EvidenceStoreError>;
}

// ============================================================================
// SECTION: Event Log
// ============================================================================

/// Event log errors.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Underlying storage unavailable.
    #[error("event log unavailable: {0}")]
    Unavailable(String),
    /// Append would break the dense per-case sequence.
    #[error("event sequence violation for case {case_id}: expected {expected}, got {got}")]
    SequenceViolation {
        /// Case whose stream was violated.
        case_id: CaseId,
        /// Expected next sequence number.
        expected: u64,
        /// Sequence number that was offered.
        got: u64,
    },
    /// Stored stream failed an integrity check on read.
    #[error("event log corrupt for case {0}")]
    Corrupt(CaseId),
}

/// Append-only per-case event stream.
pub trait EventLog: Send + Sync {
    /// Appends one event; the append is durable before return.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::SequenceViolation`] when `event.seq` is not
    /// exactly the next sequence for the case.
    fn append(&self, event: &AuditEvent) -> Result<(), EventLogError>;

    /// Reads a case's events from the given sequence, in order.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError`] when the read fails or the stream is
    /// corrupt.
    fn read_by_case(&self, case_id: &CaseId, from_seq: u64) -> Result<Vec<AuditEvent>, EventLogError>;
}

// ============================================================================
// SECTION: Case Store
// ============================================================================

/// Case store errors.
#[derive(Debug, Error)]
pub enum CaseStoreError {
    /// Underlying storage unavailable.
    #[error("case store unavailable: {0}")]
    Unavailable(String),
    /// Stored snapshot failed an integrity check.
    #[error("case store corruption: {0}")]
    Corrupt(String),
}

/// Keyed store for current case state.
pub trait CaseStore: Send + Sync {
    /// Loads a case by id.
    ///
    /// # Errors
    ///
    /// Returns [`CaseStoreError`] when loading fails.
    fn load(&self, case_id: &CaseId) -> Result<Option<CaseState>, CaseStoreError>;

    /// Saves case state.
    ///
    /// # Errors
    ///
    /// Returns [`CaseStoreError`] when saving fails.
    fn save(&self, state: &CaseState) -> Result<(), CaseStoreError>;
}

// ============================================================================
// SECTION: Match Cache
// ============================================================================

/// Match cache errors.
#[derive(Debug, Error)]
pub enum MatchCacheError {
    /// Underlying storage unavailable.
    #[error("match cache unavailable: {0}")]
    Unavailable(String),
}

/// Cached search payload with its storage timestamp.
///
/// The payload is the serialized candidate list for the keyed search; the
/// matcher owns its concrete shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCandidates {
    /// Serialized candidate list.
    pub payload: serde_json::Value,
    /// When the entry was cached.
    pub cached_at: Timestamp,
}

/// Durable tier of the two-tier match cache.
pub trait MatchCache: Send + Sync {
    /// Reads a cached entry by key.
    ///
    /// # Errors
    ///
    /// Returns [`MatchCacheError`] when the read fails.
    fn get(&self, key: &str) -> Result<Option<CachedCandidates>, MatchCacheError>;

    /// Writes a cache entry.
    ///
    /// # Errors
    ///
    /// Returns [`MatchCacheError`] when the write fails.
    fn put(&self, key: &str, record: &CachedCandidates) -> Result<(), MatchCacheError>;
}

// ============================================================================
// SECTION: Fingerprint Store
// ============================================================================

/// Fingerprint store errors.
#[derive(Debug, Error)]
pub enum FingerprintStoreError {
    /// Underlying storage unavailable.
    #[error("fingerprint store unavailable: {0}")]
    Unavailable(String),
}

/// Metadata recorded alongside a fingerprint registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintMetadata {
    /// Case that performed the registration.
    pub case_id: CaseId,
    /// Tenant owning the case.
    pub tenant_id: TenantId,
    /// Registration timestamp.
    pub registered_at: Timestamp,
}

/// Dedup index enforcing at-most-once draft creation.
pub trait FingerprintStore: Send + Sync {
    /// Looks up an existing registration.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintStoreError`] when the lookup fails.
    fn lookup(&self, fingerprint: &Sha256Digest) -> Result<Option<DraftId>, FingerprintStoreError>;

    /// Registers a fingerprint, returning the winning draft id.
    ///
    /// Registration is linearizable first-writer-wins: when a concurrent
    /// registration already happened, the stored draft id is returned and the
    /// offered one is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintStoreError`] when the registration fails.
    fn register(
        &self,
        fingerprint: &Sha256Digest,
        draft_id: &DraftId,
        metadata: &FingerprintMetadata,
    ) -> Result<DraftId, FingerprintStoreError>;
}

// ============================================================================
// SECTION: Catalog Client
// ============================================================================

/// Customer candidate returned by catalog search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerCandidate {
    /// Catalog customer id.
    pub id: CustomerId,
    /// Display / company name.
    pub display_name: String,
}

/// Item candidate returned by catalog search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCandidate {
    /// Catalog item id.
    pub id: ItemId,
    /// Item SKU.
    pub sku: String,
    /// Item GTIN, when the catalog carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtin: Option<String>,
    /// Item display name.
    pub name: String,
    /// Catalog unit price.
    pub unit_price: Money,
}

/// Item search query; exactly one field is set per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemQuery {
    /// Case-insensitive exact SKU lookup.
    Sku(String),
    /// Exact GTIN lookup via the catalog's custom field.
    Gtin(String),
    /// Fuzzy name search.
    Name(String),
}

/// One draft line submitted to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    /// Catalog item id.
    pub item_id: ItemId,
    /// Ordered quantity.
    pub quantity: f64,
    /// Catalog unit price (never the spreadsheet price).
    pub unit_price: Money,
}

/// Draft creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPayload {
    /// Tenant creating the draft.
    pub tenant_id: TenantId,
    /// Resolved customer.
    pub customer_id: CustomerId,
    /// Draft lines with catalog prices.
    pub lines: Vec<DraftLine>,
    /// Source case reference carried on the draft.
    pub case_id: CaseId,
}

/// Draft creation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftReceipt {
    /// Created (or pre-existing) draft id.
    pub draft_id: DraftId,
    /// Human-readable draft number.
    pub draft_number: String,
    /// True when the idempotency token matched an existing draft.
    pub is_duplicate: bool,
}

/// Existing draft recovered by idempotency-token scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRecord {
    /// Draft id.
    pub draft_id: DraftId,
    /// Human-readable draft number.
    pub draft_number: String,
}

/// Catalog client errors are classified [`EngineError`]s: the code decides
/// retryability (`CATALOG_UNAVAILABLE`, `CATALOG_RATE_LIMITED` are transient;
/// `CATALOG_AUTH_FAILED`, `TENANT_FORBIDDEN` are not) and `retry_after_ms`
/// floors the backoff after a 429.
pub type CatalogError = EngineError;

/// Narrow client for the external order-management system.
pub trait CatalogClient: Send + Sync {
    /// Searches customers by display/company name.
    ///
    /// # Errors
    ///
    /// Returns a classified [`CatalogError`] on transport or service failure.
    fn search_customer(
        &self,
        name: &str,
        tenant: &TenantId,
    ) -> Result<Vec<CustomerCandidate>, CatalogError>;

    /// Fetches one customer by id.
    ///
    /// # Errors
    ///
    /// Returns a classified [`CatalogError`] on transport or service failure.
    fn get_customer(&self, id: &CustomerId) -> Result<CustomerCandidate, CatalogError>;

    /// Searches items by SKU, GTIN, or name.
    ///
    /// # Errors
    ///
    /// Returns a classified [`CatalogError`] on transport or service failure.
    fn search_item(
        &self,
        query: &ItemQuery,
        tenant: &TenantId,
    ) -> Result<Vec<ItemCandidate>, CatalogError>;

    /// Creates a draft order idempotently.
    ///
    /// The fingerprint is placed into the catalog's dedicated reference field
    /// so a lost response can be recovered by
    /// [`CatalogClient::find_draft_by_idempotency_token`].
    ///
    /// # Errors
    ///
    /// Returns a classified [`CatalogError`]; transient codes are retried by
    /// the engine's aggressive policy.
    fn create_draft(
        &self,
        payload: &DraftPayload,
        idempotency_token: &Sha256Digest,
    ) -> Result<DraftReceipt, CatalogError>;

    /// Scans for an existing draft carrying the idempotency token.
    ///
    /// # Errors
    ///
    /// Returns a classified [`CatalogError`] on transport or service failure.
    fn find_draft_by_idempotency_token(
        &self,
        token: &Sha256Digest,
    ) -> Result<Option<DraftRecord>, CatalogError>;
}

// ============================================================================
// SECTION: Model Providers
// ============================================================================

/// Committee provider call errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider exceeded its time budget.
    #[error("provider timed out after {0} ms")]
    Timeout(u64),
    /// Transport-level failure reaching the provider.
    #[error("provider transport error: {0}")]
    Transport(String),
}

/// One committee model provider.
///
/// Providers receive a fully built prompt and return the raw response body;
/// validation and aggregation happen in the committee runtime.
pub trait ModelProvider: Send + Sync {
    /// Stable provider identifier.
    fn id(&self) -> ProviderId;

    /// Family tag for diversity selection.
    fn family(&self) -> ProviderFamily;

    /// Invokes the provider with a prompt under a time budget.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on timeout or transport failure.
    fn invoke(&self, prompt: &str, time_budget_ms: u64) -> Result<String, ProviderError>;
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Parser collaborator errors (infrastructure failures, not blocked files).
#[derive(Debug, Error)]
pub enum ParserError {
    /// Parser service unavailable.
    #[error("parser unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of one parse attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    /// File parsed into a canonical order.
    Parsed {
        /// The canonical order at version 1.
        order: CanonicalOrder,
        /// Candidate columns for committee review.
        columns: Vec<ColumnCandidate>,
        /// Detected language hint.
        language: Option<String>,
    },
    /// File refused for a closed-set reason.
    Blocked {
        /// Refusal reason.
        reason: BlockedReason,
    },
}

/// Spreadsheet parser collaborator; only its output contract matters here.
pub trait OrderParser: Send + Sync {
    /// Parses uploaded bytes into a canonical order or a blocked outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ParserError`] only for infrastructure failures; blocked
    /// files are a successful [`ParseOutcome::Blocked`].
    fn parse(&self, filename: &str, bytes: &[u8]) -> Result<ParseOutcome, ParserError>;
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notifier errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Delivery failed.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Kinds of user notifications the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Re-upload needed after a blocked parse.
    ReuploadNeeded,
    /// Corrections needed after a low-confidence verdict.
    CorrectionsNeeded,
    /// Customer selection needed.
    CustomerSelectionNeeded,
    /// Item selections needed.
    ItemSelectionNeeded,
    /// Order is ready for approval.
    ReadyForApproval,
    /// Reminder for a pending human-wait state.
    Reminder,
    /// Terminal success.
    Complete,
    /// Terminal cancellation.
    Cancelled,
    /// Terminal failure.
    Failed,
    /// Draft creation queued for retry.
    QueuedForRetry,
}

/// One user-facing notification.
///
/// # Invariants
/// - `message` is the non-technical summary; internal detail stays in the
///   event log, reachable via `reference`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Case the notification belongs to.
    pub case_id: CaseId,
    /// Chat thread to deliver to.
    pub thread: ChatThreadId,
    /// Notification kind.
    pub kind: NotificationKind,
    /// Non-technical summary.
    pub message: String,
    /// Correlation reference for operators.
    pub reference: CorrelationId,
    /// Suggested next step, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

/// Notification collaborator (chat bot, adaptive cards, e-mail).
pub trait Notifier: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery fails; the engine records the
    /// failure but never fails the workflow over it.
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

// ============================================================================
// SECTION: Clock & Sleeper
// ============================================================================

/// Wall-clock source for the activity layer.
///
/// The engine itself never reads time; activities stamp results with this.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Sleep primitive used by the retry executor, mockable in tests.
pub trait Sleeper: Send + Sync {
    /// Blocks the current worker for the given duration.
    fn sleep(&self, duration: Duration);
}
