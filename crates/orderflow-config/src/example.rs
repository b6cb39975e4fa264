// crates/orderflow-config/src/example.rs
// ============================================================================
// Module: Config Example Generator
// Description: Deterministic annotated orderflow.toml example.
// Purpose: Keep docs and defaults generated from one model.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! The example is generated from the default model plus a reference provider
//! pool, so documentation can never drift from the code. The config tests
//! parse the example back and compare it to the defaults.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::config::OrderflowConfig;
use crate::config::ProviderEntry;

// ============================================================================
// SECTION: Example
// ============================================================================

/// Returns the canonical annotated example configuration.
///
/// # Panics
///
/// Never panics: the default model always serializes.
#[must_use]
pub fn config_toml_example() -> String {
    let mut config = OrderflowConfig::default();
    config.committee.providers = vec![
        ProviderEntry {
            id: "claude-sonnet".to_string(),
            family: "anthropic".to_string(),
            weight: 1.0,
            time_budget_ms: 30_000,
            endpoint: Some("https://models.internal/claude".to_string()),
        },
        ProviderEntry {
            id: "gpt-4o".to_string(),
            family: "openai".to_string(),
            weight: 1.0,
            time_budget_ms: 30_000,
            endpoint: Some("https://models.internal/gpt".to_string()),
        },
        ProviderEntry {
            id: "gemini-pro".to_string(),
            family: "google".to_string(),
            weight: 1.0,
            time_budget_ms: 30_000,
            endpoint: Some("https://models.internal/gemini".to_string()),
        },
    ];
    let body = toml::to_string_pretty(&config).unwrap_or_default();
    format!(
        "# orderflow.toml\n# Canonical Orderflow worker configuration.\n# Every key shows its default; environment overrides are documented per key\n# in the operations guide.\n\n{body}"
    )
}
