// crates/orderflow-core/src/core/events.rs
// ============================================================================
// Module: Orderflow Audit Events
// Description: Append-only per-case event records with dense sequences.
// Purpose: Make every state transition observable, replayable, and auditable.
// Dependencies: crate::core::{hashing, identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Every status transition, provider call, signal, and external effect
//! produces exactly one audit event. Sequences are dense and strictly
//! increasing per case; a gap indicates corruption. Small payloads inline on
//! the event; large payloads live in the evidence store with a pointer and
//! digest retained here. Payloads pass the shared redaction step before they
//! are persisted, and the applied redactions are noted on the event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::Sha256Digest;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::ProviderId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Closed taxonomy of case event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Workflow execution accepted for a new case.
    #[serde(rename = "workflow.started")]
    WorkflowStarted,
    /// Original file persisted and digested.
    #[serde(rename = "file.stored")]
    FileStored,
    /// Parser produced a canonical order version.
    #[serde(rename = "parse.succeeded")]
    ParseSucceeded,
    /// Parser refused the file.
    #[serde(rename = "parse.blocked")]
    ParseBlocked,
    /// Committee providers selected for a review round.
    #[serde(rename = "committee.selected")]
    CommitteeSelected,
    /// One committee provider call completed.
    #[serde(rename = "committee.provider_called")]
    CommitteeProviderCalled,
    /// Committee verdict computed.
    #[serde(rename = "committee.verdict")]
    CommitteeVerdict,
    /// User corrections applied; new order version produced.
    #[serde(rename = "corrections.applied")]
    CorrectionsApplied,
    /// Customer resolved automatically.
    #[serde(rename = "customer.resolved")]
    CustomerResolved,
    /// Customer resolution needs a user selection.
    #[serde(rename = "customer.selection_requested")]
    CustomerSelectionRequested,
    /// User selected the customer.
    #[serde(rename = "customer.selected")]
    CustomerSelected,
    /// All lines resolved automatically.
    #[serde(rename = "items.resolved")]
    ItemsResolved,
    /// Item resolution needs user selections.
    #[serde(rename = "items.selection_requested")]
    ItemSelectionRequested,
    /// User selected items for unresolved lines.
    #[serde(rename = "items.selected")]
    ItemsSelected,
    /// Case is ready for approval.
    #[serde(rename = "approval.requested")]
    ApprovalRequested,
    /// Approval signal received.
    #[serde(rename = "approval.received")]
    ApprovalReceived,
    /// External draft created.
    #[serde(rename = "draft.created")]
    DraftCreated,
    /// Fingerprint hit; existing draft reused.
    #[serde(rename = "draft.deduplicated")]
    DraftDeduplicated,
    /// Fingerprint registered against the created draft.
    #[serde(rename = "fingerprint.registered")]
    FingerprintRegistered,
    /// Workflow reached terminal `completed`.
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted,
    /// Workflow reached terminal `cancelled`.
    #[serde(rename = "workflow.cancelled")]
    WorkflowCancelled,
    /// Workflow reached terminal `failed`.
    #[serde(rename = "workflow.failed")]
    WorkflowFailed,
    /// Draft creation hit a transient failure; case queued for retry.
    #[serde(rename = "workflow.queued_for_retry")]
    WorkflowQueuedForRetry,
    /// Execution continued-as-new after a file re-upload.
    #[serde(rename = "workflow.continued")]
    WorkflowContinued,
    /// Signal arrived in a state that does not accept it.
    #[serde(rename = "signal.ignored")]
    SignalIgnored,
    /// Notification handed to the notifier collaborator.
    #[serde(rename = "notification.sent")]
    NotificationSent,
    /// Matching served a stale cache entry during a catalog outage.
    #[serde(rename = "cache.stale")]
    StaleCacheServed,
}

// ============================================================================
// SECTION: Actors
// ============================================================================

/// Who caused an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// The workflow engine itself.
    System,
    /// An end user, via signal or correction.
    User(UserId),
    /// A committee model provider.
    Provider(ProviderId),
}

// ============================================================================
// SECTION: Blob Pointers
// ============================================================================

/// Pointer to a large payload spilled into the evidence store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobPointer {
    /// Evidence-store path of the payload.
    pub path: String,
    /// Digest of the stored bytes.
    pub sha256: Sha256Digest,
}

// ============================================================================
// SECTION: Audit Event
// ============================================================================

/// One append-only case event.
///
/// # Invariants
/// - `seq` values per case form a dense prefix of the naturals starting at 1.
/// - Events are never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Dense per-case sequence number, starting at 1.
    pub seq: u64,
    /// Event timestamp supplied by the activity layer.
    pub ts: Timestamp,
    /// Case the event belongs to.
    pub case_id: CaseId,
    /// Tenant owning the case.
    pub tenant_id: TenantId,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Actor that caused the event.
    pub actor: Actor,
    /// Correlation context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationId>,
    /// Small inline payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Pointers to large payloads in the evidence store.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pointers: Vec<BlobPointer>,
    /// Redaction notes applied to the payload.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redactions: Vec<String>,
}

impl AuditEvent {
    /// Renders the event as one JSONL record with an RFC 3339 `ts` key.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] when serialization fails, which only
    /// happens if an inline payload contains non-finite numbers.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("ts".to_string(), Value::String(self.ts.to_rfc3339()));
        }
        serde_json::to_string(&value)
    }
}
