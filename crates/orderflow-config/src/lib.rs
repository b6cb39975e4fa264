// crates/orderflow-config/src/lib.rs
// ============================================================================
// Module: Orderflow Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for orderflow.toml semantics.
// Dependencies: orderflow-core, serde, toml
// ============================================================================

//! ## Overview
//! `orderflow-config` defines the canonical configuration model for the
//! Orderflow worker. Configuration loads from a TOML file with strict size
//! and shape limits, accepts the documented environment-variable overrides,
//! and fails closed on anything unknown or out of range.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod example;
pub mod weights;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use example::config_toml_example;
pub use weights::WeightsSnapshot;
pub use weights::load_weights;
