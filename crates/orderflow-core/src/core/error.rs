// crates/orderflow-core/src/core/error.rs
// ============================================================================
// Module: Orderflow Error Taxonomy
// Description: Stable error codes, retryability kinds, and user messages.
// Purpose: Give every failure a classification the engine can act on.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Orderflow never uses errors as opaque control flow. Every failure carries a
//! stable [`ErrorCode`] and a derived [`ErrorKind`]: the retry executor
//! consults the kind, the event log records the code, and user-visible
//! messages map from the code via [`user_message`]. Logic errors route to
//! human-wait states instead of failing the workflow; internal errors are
//! always terminal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Retryability classification consulted by the retry executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid input; non-retryable and terminal at its step.
    Input,
    /// Transient external failure; retryable per the aggressive policy.
    Transient,
    /// Authorization failure; non-retryable, surfaced to operators.
    Auth,
    /// Business-logic outcome routed to a human-wait state.
    Logic,
    /// Internal invariant failure; non-retryable, terminal `failed`.
    Internal,
}

// ============================================================================
// SECTION: Error Code
// ============================================================================

/// Closed taxonomy of stable Orderflow error codes.
///
/// # Invariants
/// - Wire forms are SCREAMING_SNAKE_CASE and stable for audit records.
/// - Every code maps to exactly one [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Parser refused the file (formulas, protection, size, or corruption).
    BlockedFile,
    /// File content could not be parsed into a canonical order.
    ParseUnparsable,
    /// Malformed request or signal payload.
    InvalidRequest,
    /// Input failed semantic validation.
    ValidationFailed,
    /// External catalog unreachable or returned a server error.
    CatalogUnavailable,
    /// External catalog rate limit hit.
    CatalogRateLimited,
    /// A committee provider exceeded its time budget.
    ProviderTimeout,
    /// Blob or database storage unavailable.
    StorageUnavailable,
    /// Catalog authentication or token refresh failed.
    CatalogAuthFailed,
    /// Tenant is not permitted to perform the operation.
    TenantForbidden,
    /// Customer matched multiple candidates within the ambiguity gap.
    CustomerAmbiguous,
    /// Customer produced no catalog candidates.
    CustomerNotFound,
    /// One or more lines could not be resolved to catalog items.
    ItemsUnresolved,
    /// Committee verdict requires human review.
    CommitteeDisagreement,
    /// Declared totals disagree with line arithmetic beyond tolerance.
    ArithmeticMismatch,
    /// Line carries neither SKU nor GTIN.
    MissingItemIdentifier,
    /// A core invariant was violated.
    InvariantViolated,
    /// Non-determinism detected during replay.
    DeterminismViolated,
    /// Event-log sequence gap detected.
    EventLogGap,
}

impl ErrorCode {
    /// Returns the stable wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BlockedFile => "BLOCKED_FILE",
            Self::ParseUnparsable => "PARSE_UNPARSABLE",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::CatalogUnavailable => "CATALOG_UNAVAILABLE",
            Self::CatalogRateLimited => "CATALOG_RATE_LIMITED",
            Self::ProviderTimeout => "PROVIDER_TIMEOUT",
            Self::StorageUnavailable => "STORAGE_UNAVAILABLE",
            Self::CatalogAuthFailed => "CATALOG_AUTH_FAILED",
            Self::TenantForbidden => "TENANT_FORBIDDEN",
            Self::CustomerAmbiguous => "CUSTOMER_AMBIGUOUS",
            Self::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            Self::ItemsUnresolved => "ITEMS_UNRESOLVED",
            Self::CommitteeDisagreement => "COMMITTEE_DISAGREEMENT",
            Self::ArithmeticMismatch => "ARITHMETIC_MISMATCH",
            Self::MissingItemIdentifier => "MISSING_ITEM_IDENTIFIER",
            Self::InvariantViolated => "INVARIANT_VIOLATED",
            Self::DeterminismViolated => "DETERMINISM_VIOLATED",
            Self::EventLogGap => "EVENT_LOG_GAP",
        }
    }

    /// Returns the retryability kind for this code.
    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::BlockedFile | Self::ParseUnparsable | Self::InvalidRequest | Self::ValidationFailed => {
                ErrorKind::Input
            }
            Self::CatalogUnavailable
            | Self::CatalogRateLimited
            | Self::ProviderTimeout
            | Self::StorageUnavailable => ErrorKind::Transient,
            Self::CatalogAuthFailed | Self::TenantForbidden => ErrorKind::Auth,
            Self::CustomerAmbiguous
            | Self::CustomerNotFound
            | Self::ItemsUnresolved
            | Self::CommitteeDisagreement
            | Self::ArithmeticMismatch
            | Self::MissingItemIdentifier => ErrorKind::Logic,
            Self::InvariantViolated | Self::DeterminismViolated | Self::EventLogGap => {
                ErrorKind::Internal
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Engine Error
// ============================================================================

/// Classified failure returned by activities and the workflow engine.
///
/// # Invariants
/// - `retry_after_ms` is only meaningful for [`ErrorKind::Transient`] codes
///   and floors the next backoff delay when present.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct EngineError {
    /// Stable error code recorded in the event log.
    pub code: ErrorCode,
    /// Operator-facing detail; never shown to end users.
    pub message: String,
    /// Server-requested minimum delay before the next attempt, if any.
    pub retry_after_ms: Option<u64>,
}

impl EngineError {
    /// Creates a classified error with the given code and detail.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attaches a server-requested retry floor in milliseconds.
    #[must_use]
    pub const fn with_retry_after(mut self, millis: u64) -> Self {
        self.retry_after_ms = Some(millis);
        self
    }

    /// Returns the retryability kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.code.kind()
    }
}

// ============================================================================
// SECTION: User Messages
// ============================================================================

/// Maps an error code to the non-technical summary shown to end users.
///
/// Internal detail never crosses this boundary; operators trace the full
/// context through the correlation id instead.
#[must_use]
pub const fn user_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::BlockedFile => "The uploaded file could not be processed. Please re-upload a plain spreadsheet.",
        ErrorCode::ParseUnparsable => "The spreadsheet could not be read as an order.",
        ErrorCode::InvalidRequest => "The request was not valid.",
        ErrorCode::ValidationFailed => "The order data failed validation.",
        ErrorCode::CatalogUnavailable => "The order system is temporarily unavailable. The order has been queued.",
        ErrorCode::CatalogRateLimited => "The order system is busy. The order will be retried shortly.",
        ErrorCode::ProviderTimeout => "Automated review took too long and will be retried.",
        ErrorCode::StorageUnavailable => "Storage is temporarily unavailable.",
        ErrorCode::CatalogAuthFailed => "The connection to the order system needs attention from an operator.",
        ErrorCode::TenantForbidden => "Your organisation is not permitted to perform this action.",
        ErrorCode::CustomerAmbiguous => "More than one customer matches this order. Please pick the right one.",
        ErrorCode::CustomerNotFound => "No matching customer was found. Please pick or create one.",
        ErrorCode::ItemsUnresolved => "Some order lines need your help to match catalog items.",
        ErrorCode::CommitteeDisagreement => "Automated review was not confident. Please check the highlighted fields.",
        ErrorCode::ArithmeticMismatch => "The order totals do not add up. Please review them.",
        ErrorCode::MissingItemIdentifier => "A line is missing both SKU and barcode.",
        ErrorCode::InvariantViolated | ErrorCode::DeterminismViolated | ErrorCode::EventLogGap => {
            "Something went wrong on our side. An operator has been notified."
        }
    }
}
