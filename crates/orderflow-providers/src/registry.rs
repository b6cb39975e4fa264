// crates/orderflow-providers/src/registry.rs
// ============================================================================
// Module: Provider Registry
// Description: Maps declared provider entries onto provider constructors.
// Purpose: Assemble the runnable committee pool from configuration.
// Dependencies: orderflow-config, orderflow-core
// ============================================================================

//! ## Overview
//! Declared entries with an endpoint become HTTP providers; entries without
//! one become fixture providers answering an empty mapping, which keeps local
//! smoke setups runnable while making their votes unusable. Calibrated
//! weights from the weights snapshot supersede declared weights.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use orderflow_config::ProviderEntry;
use orderflow_config::WeightsSnapshot;
use orderflow_core::PoolEntry;
use orderflow_core::ProviderFamily;
use orderflow_core::ProviderId;
use orderflow_core::ProviderSpec;
use thiserror::Error;

use crate::fixture::FixtureProvider;
use crate::http::HttpModelProvider;
use crate::http::HttpProviderConfig;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pool assembly errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A declared endpoint could not be turned into a provider.
    #[error("provider {id}: {detail}")]
    Construction {
        /// Provider identifier.
        id: String,
        /// Failure detail.
        detail: String,
    },
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Builds the committee pool from declared entries and calibrated weights.
///
/// # Errors
///
/// Returns [`RegistryError`] when an endpoint is invalid; assembly is
/// all-or-nothing so a half-built pool never runs.
pub fn build_pool(
    entries: &[ProviderEntry],
    weights: &WeightsSnapshot,
    http_config: &HttpProviderConfig,
) -> Result<Vec<PoolEntry>, RegistryError> {
    let mut pool = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = ProviderId::new(entry.id.clone());
        let family = ProviderFamily::new(entry.family.clone());
        let spec = ProviderSpec {
            id: id.clone(),
            family: family.clone(),
            weight: weights.weight_of(&entry.id).unwrap_or(entry.weight),
            time_budget_ms: entry.time_budget_ms,
        };
        let provider: Arc<dyn orderflow_core::ModelProvider> = match &entry.endpoint {
            Some(endpoint) => Arc::new(
                HttpModelProvider::new(id, family, endpoint, http_config.clone()).map_err(
                    |err| RegistryError::Construction {
                        id: entry.id.clone(),
                        detail: err.to_string(),
                    },
                )?,
            ),
            None => Arc::new(FixtureProvider::new(
                id,
                family,
                "{\"mappings\":[],\"issues\":[],\"overallConfidence\":0.0}",
            )),
        };
        pool.push(PoolEntry {
            spec,
            provider,
        });
    }
    Ok(pool)
}
