// crates/orderflow-server/src/telemetry.rs
// ============================================================================
// Module: Server Telemetry
// Description: Request metric events behind a pluggable sink.
// Purpose: Count requests, outcomes, and latency without a metrics backend.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The control surface reports one metric event per request: the route, the
//! outcome class, and the wall latency. Deployments plug their metrics
//! system in behind [`ServerMetrics`]; the default sink drops everything.

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Outcome class of one control-surface request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Request succeeded.
    Ok,
    /// Request was rejected as invalid or conflicting.
    Rejected,
    /// Request failed on the engine or storage side.
    Failed,
}

// ============================================================================
// SECTION: Metrics Sink
// ============================================================================

/// Pluggable metric sink for the control surface.
pub trait ServerMetrics: Send + Sync {
    /// Records one request.
    fn record(&self, route: &'static str, outcome: RequestOutcome, latency_ms: u64);
}

/// Metrics sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl ServerMetrics for NoopMetrics {
    fn record(&self, _route: &'static str, _outcome: RequestOutcome, _latency_ms: u64) {}
}
