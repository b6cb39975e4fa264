// crates/orderflow-core/src/runtime/replay.rs
// ============================================================================
// Module: Orderflow Replay
// Description: Case reconstruction from the append-only event stream.
// Purpose: Detect determinism violations by comparing replay to the snapshot.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! Transition events carry the resulting status and the load-bearing fields
//! in their inline payload, so the event stream alone reconstructs what the
//! workflow observed. Replaying up to event `k` reproduces the state just
//! after event `k`; a mismatch against the stored snapshot means a
//! determinism or event-log invariant was violated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::CaseStatus;
use crate::core::Sha256Digest;
use crate::core::case::CaseState;
use crate::core::events::AuditEvent;
use crate::core::events::EventType;
use crate::core::identifiers::DraftId;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Divergences detected during replay.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayDivergence {
    /// The stream has a sequence gap.
    #[error("event sequence gap: expected {expected}, got {got}")]
    SequenceGap {
        /// Expected next sequence.
        expected: u64,
        /// Sequence found on the event.
        got: u64,
    },
    /// A transition event lacks its status payload.
    #[error("event {seq} carries no transition status")]
    MissingStatus {
        /// Sequence of the offending event.
        seq: u64,
        /// Event type.
        event: EventType,
    },
}

// ============================================================================
// SECTION: Replayed View
// ============================================================================

/// State reconstructed from the event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayedCase {
    /// Last observed status.
    pub status: Option<CaseStatus>,
    /// Highest sequence seen.
    pub last_seq: u64,
    /// Draft id, once created or deduplicated.
    pub draft_id: Option<DraftId>,
    /// Fingerprint, once registered.
    pub fingerprint: Option<Sha256Digest>,
    /// Canonical-order versions produced.
    pub order_versions: u32,
    /// Execution count (1 + continue-as-new transitions).
    pub executions: u32,
}

impl ReplayedCase {
    /// Compares the replayed view against a stored snapshot.
    ///
    /// Returns human-readable divergences; empty means the snapshot is
    /// consistent with its own history.
    #[must_use]
    pub fn diff_against(&self, snapshot: &CaseState) -> Vec<String> {
        let mut diffs = Vec::new();
        if let Some(status) = self.status
            && status != snapshot.status
        {
            diffs.push(format!(
                "status: replay {}, snapshot {}",
                status_label(status),
                status_label(snapshot.status)
            ));
        }
        if self.last_seq != snapshot.history_length() {
            diffs.push(format!(
                "history length: replay {}, snapshot {}",
                self.last_seq,
                snapshot.history_length()
            ));
        }
        if self.draft_id != snapshot.external_draft_id {
            diffs.push(format!(
                "draft id: replay {}, snapshot {}",
                option_label(self.draft_id.as_ref().map(DraftId::as_str)),
                option_label(snapshot.external_draft_id.as_ref().map(DraftId::as_str))
            ));
        }
        if self.fingerprint != snapshot.fingerprint {
            diffs.push(format!(
                "fingerprint: replay {}, snapshot {}",
                option_label(self.fingerprint.as_ref().map(Sha256Digest::as_str)),
                option_label(snapshot.fingerprint.as_ref().map(Sha256Digest::as_str))
            ));
        }
        if self.order_versions != snapshot.order_version {
            diffs.push(format!(
                "order versions: replay {}, snapshot {}",
                self.order_versions, snapshot.order_version
            ));
        }
        if self.executions != snapshot.execution {
            diffs.push(format!(
                "executions: replay {}, snapshot {}",
                self.executions, snapshot.execution
            ));
        }
        diffs
    }
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Replays a case from its event stream.
///
/// # Errors
///
/// Returns [`ReplayDivergence`] on a sequence gap or a malformed transition
/// event; both indicate corruption rather than a recoverable condition.
pub fn replay_case(events: &[AuditEvent]) -> Result<ReplayedCase, ReplayDivergence> {
    let mut view = ReplayedCase {
        executions: u32::from(!events.is_empty()),
        ..ReplayedCase::default()
    };

    let mut expected = 1_u64;
    for event in events {
        if event.seq != expected {
            return Err(ReplayDivergence::SequenceGap {
                expected,
                got: event.seq,
            });
        }
        expected += 1;
        view.last_seq = event.seq;

        if let Some(status) = event_status(event) {
            view.status = Some(status);
        } else if is_transition(event.event_type) {
            return Err(ReplayDivergence::MissingStatus {
                seq: event.seq,
                event: event.event_type,
            });
        }

        match event.event_type {
            EventType::ParseSucceeded | EventType::CorrectionsApplied => {
                view.order_versions += 1;
            }
            EventType::WorkflowContinued => {
                view.executions += 1;
            }
            EventType::DraftCreated | EventType::DraftDeduplicated => {
                if let Some(draft_id) = event
                    .data
                    .as_ref()
                    .and_then(|data| data.get("draft_id"))
                    .and_then(Value::as_str)
                {
                    view.draft_id = Some(DraftId::new(draft_id));
                }
                replay_fingerprint(event, &mut view);
            }
            EventType::FingerprintRegistered | EventType::WorkflowQueuedForRetry => {
                replay_fingerprint(event, &mut view);
            }
            _ => {}
        }
    }

    Ok(view)
}

/// Renders a case status with its stable wire name.
fn status_label(status: CaseStatus) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|value| value.as_str().map(ToString::to_string))
        .unwrap_or_default()
}

/// Renders an optional value with `none` for absence.
fn option_label(value: Option<&str>) -> String {
    value.unwrap_or("none").to_string()
}

/// Folds a fingerprint payload key into the replayed view, when present.
fn replay_fingerprint(event: &AuditEvent, view: &mut ReplayedCase) {
    if let Some(fingerprint) = event
        .data
        .as_ref()
        .and_then(|data| data.get("fingerprint"))
        .and_then(Value::as_str)
        .and_then(|hex| Sha256Digest::parse(hex).ok())
    {
        view.fingerprint = Some(fingerprint);
    }
}

/// Extracts the post-transition status from an event payload.
fn event_status(event: &AuditEvent) -> Option<CaseStatus> {
    event
        .data
        .as_ref()
        .and_then(|data| data.get("status"))
        .and_then(|status| serde_json::from_value(status.clone()).ok())
}

/// Returns true for event types that must carry a status payload.
const fn is_transition(event_type: EventType) -> bool {
    matches!(
        event_type,
        EventType::WorkflowStarted
            | EventType::FileStored
            | EventType::ParseSucceeded
            | EventType::ParseBlocked
            | EventType::CommitteeVerdict
            | EventType::CorrectionsApplied
            | EventType::CustomerResolved
            | EventType::CustomerSelectionRequested
            | EventType::CustomerSelected
            | EventType::ItemSelectionRequested
            | EventType::ItemsSelected
            | EventType::ApprovalRequested
            | EventType::ApprovalReceived
            | EventType::WorkflowCompleted
            | EventType::WorkflowCancelled
            | EventType::WorkflowFailed
            | EventType::WorkflowQueuedForRetry
            | EventType::WorkflowContinued
    )
}
