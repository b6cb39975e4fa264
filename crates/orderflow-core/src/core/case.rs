// crates/orderflow-core/src/core/case.rs
// ============================================================================
// Module: Orderflow Case State
// Description: Top-level case aggregate tracked from upload to terminal.
// Purpose: Capture the engine-owned view of one order's progress.
// Dependencies: crate::core::{committee, error, hashing, identifiers,
// matching, order, time}, serde
// ============================================================================

//! ## Overview
//! A case is created when a file upload arrives, mutated exclusively by the
//! workflow engine, and archived (never destroyed) after a terminal status.
//! The record stores pointers into the evidence store rather than artifact
//! content, so it stays small while everything remains traceable. `case_id`
//! doubles as the workflow identity, which is what forbids concurrent
//! executions for one case.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::committee::ColumnCandidate;
use crate::core::committee::CommitteeVerdict;
use crate::core::error::ErrorCode;
use crate::core::hashing::Sha256Digest;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::ChatThreadId;
use crate::core::identifiers::ColumnId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::CustomerId;
use crate::core::identifiers::DraftId;
use crate::core::identifiers::ItemId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::matching::MatchCandidate;
use crate::core::matching::PriceAudit;
use crate::core::order::BlockedReason;
use crate::core::order::Money;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Case Status
// ============================================================================

/// Case lifecycle status.
///
/// # Invariants
/// - Wire forms are stable; the event log records them verbatim.
/// - Terminal statuses are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Step 1: persisting the uploaded file.
    StoringFile,
    /// Step 2: parsing (also covers the blocked-file wait for re-upload).
    Parsing,
    /// Step 3: committee review in progress.
    RunningCommittee,
    /// Waiting for user corrections after a low-confidence verdict.
    AwaitingCorrections,
    /// Step 4: resolving the customer.
    ResolvingCustomer,
    /// Waiting for a user customer selection.
    AwaitingCustomerSelection,
    /// Step 5: resolving line items.
    ResolvingItems,
    /// Waiting for user item selections.
    AwaitingItemSelection,
    /// Step 6: waiting for the approval signal.
    AwaitingApproval,
    /// Step 7: creating the external draft.
    CreatingDraft,
    /// Draft creation hit a transient failure; awaiting external retry.
    QueuedForRetry,
    /// Terminal: draft created and bundle sealed.
    Completed,
    /// Terminal: rejected or terminated.
    Cancelled,
    /// Terminal: non-retryable failure.
    Failed,
}

impl CaseStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Returns true for statuses waiting on human input.
    #[must_use]
    pub const fn is_human_wait(self) -> bool {
        matches!(
            self,
            Self::AwaitingCorrections
                | Self::AwaitingCustomerSelection
                | Self::AwaitingItemSelection
                | Self::AwaitingApproval
        )
    }
}

// ============================================================================
// SECTION: Resolved Entities
// ============================================================================

/// Customer resolution outcome recorded on the case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCustomer {
    /// Catalog customer id.
    pub customer_id: CustomerId,
    /// Catalog display name.
    pub display_name: String,
    /// Match confidence (1.0 for exact or user selection).
    pub confidence: f64,
    /// Whether a user picked this customer explicitly.
    pub selected_by_user: bool,
}

/// Per-line item resolution recorded on the case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLine {
    /// Line number within the order.
    pub line_number: u32,
    /// Catalog item id.
    pub item_id: ItemId,
    /// Catalog unit price used on the draft.
    pub catalog_price: Money,
    /// Sheet-versus-catalog price comparison.
    pub price_audit: PriceAudit,
    /// Whether a user picked this item explicitly.
    pub selected_by_user: bool,
}

/// Candidates awaiting a user selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingSelection {
    /// Customer candidates, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub customer_candidates: Vec<MatchCandidate>,
    /// Item candidates per unresolved line.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub item_candidates: BTreeMap<u32, Vec<MatchCandidate>>,
}

/// Approval signal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Whether the order was approved.
    pub approved: bool,
    /// User who decided.
    pub by: UserId,
    /// Optional reviewer comments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

// ============================================================================
// SECTION: Case State
// ============================================================================

/// Engine-owned aggregate for one order case.
///
/// # Invariants
/// - Mutated only by the workflow engine; other components write to the
///   event log exclusively.
/// - `next_seq` is the sequence the next appended event will carry; events
///   already appended form the dense range `1..next_seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseState {
    /// Case identifier (also the workflow identity).
    pub case_id: CaseId,
    /// Tenant owning the case.
    pub tenant_id: TenantId,
    /// User who started the case.
    pub user_id: UserId,
    /// Chat thread that receives notifications.
    pub chat_thread: ChatThreadId,
    /// Correlation id for tracing.
    pub correlation_id: CorrelationId,
    /// Current lifecycle status.
    pub status: CaseStatus,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last-update timestamp.
    pub updated_at: Timestamp,
    /// Execution counter; bumped on continue-as-new.
    pub execution: u32,
    /// Evidence-store path of the current source file.
    pub blob_uri: String,
    /// Digest of the stored original file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_sha256: Option<Sha256Digest>,
    /// Present while parsing is blocked awaiting a re-upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting_reupload: Option<BlockedReason>,
    /// Current canonical-order version (0 before the first parse).
    pub order_version: u32,
    /// Evidence-store paths of every canonical-order version, oldest first.
    #[serde(default)]
    pub order_paths: Vec<String>,
    /// Candidate columns from the parser, kept for committee re-runs.
    #[serde(default)]
    pub columns: Vec<ColumnCandidate>,
    /// Detected language hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// User-pinned field-to-column constraints from corrections.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pinned: BTreeMap<String, ColumnId>,
    /// Latest committee verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<CommitteeVerdict>,
    /// Number of committee rounds run so far.
    pub verdict_round: u32,
    /// Resolved customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_customer: Option<ResolvedCustomer>,
    /// Resolved lines.
    #[serde(default)]
    pub resolved_lines: Vec<ResolvedLine>,
    /// Candidates awaiting user selection, when in a selection state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingSelection>,
    /// Approval record once the signal arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalRecord>,
    /// Order fingerprint computed at draft creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Sha256Digest>,
    /// External draft id once created or deduplicated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_draft_id: Option<DraftId>,
    /// Human-readable draft number from the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_number: Option<String>,
    /// Whether the draft was deduplicated from a prior fingerprint.
    #[serde(default)]
    pub draft_duplicate: bool,
    /// Failure code for terminal `failed` or `queued_for_retry`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ErrorCode>,
    /// Sequence number the next event will carry.
    pub next_seq: u64,
    /// Digest of the sealed audit-bundle manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_hash: Option<Sha256Digest>,
}

impl CaseState {
    /// Number of events appended so far.
    #[must_use]
    pub const fn history_length(&self) -> u64 {
        self.next_seq.saturating_sub(1)
    }

    /// Evidence-store path of the current canonical-order version.
    #[must_use]
    pub fn current_order_path(&self) -> Option<&str> {
        self.order_paths.last().map(String::as_str)
    }
}
