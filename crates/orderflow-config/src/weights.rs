// crates/orderflow-config/src/weights.rs
// ============================================================================
// Module: Calibrated Weights
// Description: Read-mostly provider weight snapshot from the weights file.
// Purpose: Apply offline calibration without mutating shared state.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The weights file is a JSON object mapping provider id to calibrated
//! weight, produced offline against a golden set. It loads once at worker
//! start into an immutable snapshot; a configuration-change event triggers a
//! re-read and swap rather than in-place mutation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use orderflow_core::ProviderSpec;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Weights file errors.
#[derive(Debug, Error)]
pub enum WeightsError {
    /// File missing or unreadable.
    #[error("weights file unreadable: {0}")]
    Unreadable(String),
    /// File content malformed.
    #[error("weights file malformed: {0}")]
    Malformed(String),
    /// A weight was non-finite or non-positive.
    #[error("weight for {0} must be finite and positive")]
    InvalidWeight(String),
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Immutable calibrated-weight snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightsSnapshot {
    /// Calibrated weight per provider id.
    weights: BTreeMap<String, f64>,
}

impl WeightsSnapshot {
    /// Returns the calibrated weight for a provider, when present.
    #[must_use]
    pub fn weight_of(&self, provider_id: &str) -> Option<f64> {
        self.weights.get(provider_id).copied()
    }

    /// Applies the snapshot over declared provider specs.
    ///
    /// Providers absent from the snapshot keep their declared weight.
    #[must_use]
    pub fn apply(&self, mut specs: Vec<ProviderSpec>) -> Vec<ProviderSpec> {
        for spec in &mut specs {
            if let Some(weight) = self.weight_of(spec.id.as_str()) {
                spec.weight = weight;
            }
        }
        specs
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads and validates a weights file.
///
/// # Errors
///
/// Returns [`WeightsError`] on unreadable or malformed content, or any
/// non-finite / non-positive weight.
pub fn load_weights(path: &Path) -> Result<WeightsSnapshot, WeightsError> {
    let text = fs::read_to_string(path).map_err(|err| WeightsError::Unreadable(err.to_string()))?;
    let raw: BTreeMap<String, f64> =
        serde_json::from_str(&text).map_err(|err| WeightsError::Malformed(err.to_string()))?;
    for (id, weight) in &raw {
        if !(weight.is_finite() && *weight > 0.0) {
            return Err(WeightsError::InvalidWeight(id.clone()));
        }
    }
    Ok(WeightsSnapshot {
        weights: raw,
    })
}
