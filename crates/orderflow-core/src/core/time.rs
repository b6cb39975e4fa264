// crates/orderflow-core/src/core/time.rs
// ============================================================================
// Module: Orderflow Time Model
// Description: Canonical timestamp representation for events and records.
// Purpose: Provide deterministic, replayable time values across case records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Orderflow keeps workflow transitions replay-deterministic by never reading
//! wall-clock time inside the engine. Timestamps enter through the activity
//! layer (the [`crate::interfaces::Clock`] collaborator) or through signal
//! payloads, and are carried explicitly on every event. Tests use logical
//! time; production uses unix milliseconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in Orderflow events and case records.
///
/// # Invariants
/// - Values are explicitly provided by callers; the engine never reads
///   wall-clock time directly.
/// - Monotonicity per case is a caller responsibility (the activity layer
///   stamps events in append order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    /// Unix epoch milliseconds.
    UnixMillis(i64),
    /// Monotonic logical time value for deterministic tests.
    Logical(u64),
}

impl Timestamp {
    /// Returns the timestamp as unix milliseconds.
    ///
    /// Logical values are interpreted as milliseconds since the epoch so that
    /// deterministic tests still produce valid wire timestamps.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        match self {
            Self::UnixMillis(value) => *value,
            #[allow(
                clippy::cast_possible_wrap,
                reason = "Logical test clocks never approach i64::MAX milliseconds."
            )]
            Self::Logical(value) => *value as i64,
        }
    }

    /// Renders the timestamp as an RFC 3339 string for the JSONL boundary.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        let millis = self.as_millis();
        let nanos = i128::from(millis) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| format!("invalid-timestamp:{millis}"))
    }
}
