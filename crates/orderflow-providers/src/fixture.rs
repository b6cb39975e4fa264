// crates/orderflow-providers/src/fixture.rs
// ============================================================================
// Module: Fixture Model Provider
// Description: Committee provider answering from canned responses.
// Purpose: Deterministic committee rounds in tests and local development.
// Dependencies: orderflow-core
// ============================================================================

//! ## Overview
//! The fixture provider returns a fixed response body, optionally switched on
//! prompt substrings so a scenario can change its answer after user pins land
//! in the prompt. It performs no I/O and never fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use orderflow_core::ModelProvider;
use orderflow_core::ProviderError;
use orderflow_core::ProviderFamily;
use orderflow_core::ProviderId;

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Committee provider answering from canned bodies.
pub struct FixtureProvider {
    /// Provider identifier.
    id: ProviderId,
    /// Provider family tag.
    family: ProviderFamily,
    /// Default response body.
    default_body: String,
    /// Substring-triggered overrides, checked in order.
    overrides: Vec<(String, String)>,
}

impl FixtureProvider {
    /// Creates a provider with a single fixed body.
    #[must_use]
    pub fn new(id: ProviderId, family: ProviderFamily, body: impl Into<String>) -> Self {
        Self {
            id,
            family,
            default_body: body.into(),
            overrides: Vec::new(),
        }
    }

    /// Adds a body served when the prompt contains `needle`.
    #[must_use]
    pub fn with_override(mut self, needle: impl Into<String>, body: impl Into<String>) -> Self {
        self.overrides.push((needle.into(), body.into()));
        self
    }
}

impl ModelProvider for FixtureProvider {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    fn family(&self) -> ProviderFamily {
        self.family.clone()
    }

    fn invoke(&self, prompt: &str, _time_budget_ms: u64) -> Result<String, ProviderError> {
        for (needle, body) in &self.overrides {
            if prompt.contains(needle) {
                return Ok(body.clone());
            }
        }
        Ok(self.default_body.clone())
    }
}
