// crates/orderflow-core/src/core/issue.rs
// ============================================================================
// Module: Orderflow Issues
// Description: Structured findings attached to canonical orders.
// Purpose: Surface parse and validation findings with stable codes.
// Dependencies: crate::core::{error, order}, serde
// ============================================================================

//! ## Overview
//! Issues are structured findings carried on a canonical order. Codes come
//! from the shared error taxonomy so the event log, notifications, and the
//! order itself speak one vocabulary. An issue may demand human input without
//! blocking the pipeline (arithmetic mismatches are surfaced, not fatal).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::ErrorCode;
use crate::core::order::EvidenceCell;

// ============================================================================
// SECTION: Severity
// ============================================================================

/// Issue severity ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational finding.
    Info,
    /// Warning; the pipeline continues.
    Warning,
    /// Error; the affected line cannot be resolved without input.
    Error,
    /// Blocker; the case cannot proceed past its current step.
    Blocker,
}

// ============================================================================
// SECTION: Issue
// ============================================================================

/// Structured finding produced by parsing or validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Stable code from the shared taxonomy.
    pub code: ErrorCode,
    /// Severity of the finding.
    pub severity: Severity,
    /// Operator-facing message.
    pub message: String,
    /// Evidence cell substantiating the finding, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceCell>,
    /// Whether human input is required to clear the finding.
    pub requires_human: bool,
}

impl Issue {
    /// Creates a warning-level issue with no evidence reference.
    #[must_use]
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            message: message.into(),
            evidence: None,
            requires_human: false,
        }
    }

    /// Creates an error-level issue that requires human input.
    #[must_use]
    pub fn needs_human(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            evidence: None,
            requires_human: true,
        }
    }

    /// Attaches the evidence cell substantiating this finding.
    #[must_use]
    pub fn with_evidence(mut self, evidence: EvidenceCell) -> Self {
        self.evidence = Some(evidence);
        self
    }
}
