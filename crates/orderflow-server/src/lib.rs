// crates/orderflow-server/src/lib.rs
// ============================================================================
// Module: Orderflow Server Library
// Description: Control surface over the workflow engine.
// Purpose: Expose start, status, signals, queries, and probes over HTTP.
// Dependencies: crate::{collaborators, server, state, telemetry}
// ============================================================================

//! ## Overview
//! The control surface is a thin synchronous adapter: it validates
//! arguments, forwards to the engine on the blocking pool, and maps engine
//! outcomes onto HTTP statuses. Per-case locks serialize engine access so a
//! case never runs two transitions concurrently; an activity semaphore
//! bounds total concurrent engine work; a housekeeping tick emits reminders
//! for cases parked on human input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod collaborators;
pub mod server;
pub mod state;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use collaborators::PassthroughParser;
pub use collaborators::WebhookNotifier;
pub use server::ServerConfig;
pub use server::build_router;
pub use server::run_server;
pub use state::AppState;
pub use telemetry::NoopMetrics;
pub use telemetry::RequestOutcome;
pub use telemetry::ServerMetrics;
