// crates/orderflow-core/src/core/matching.rs
// ============================================================================
// Module: Orderflow Match Outcomes
// Description: Customer and item match classifications with candidates.
// Purpose: Define the matching engine's result contract.
// Dependencies: crate::core::{identifiers, order}, serde
// ============================================================================

//! ## Overview
//! Matching resolves free-text customer names and line-item identifiers
//! against the external catalog. Outcomes are classified so the engine can
//! branch: `resolved` continues the pipeline, `ambiguous`/`not_found`/
//! `needs_user_input` route to the selection subflows with ranked candidates
//! surfaced to the user.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CustomerId;
use crate::core::identifiers::ItemId;
use crate::core::order::Money;

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Match classification for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Exactly one acceptable candidate.
    Resolved,
    /// Top candidates scored within the ambiguity gap.
    Ambiguous,
    /// No candidate reached the threshold.
    NotFound,
    /// Resolution requires information only the user has.
    NeedsUserInput,
}

/// Ranked match candidate surfaced to users on ambiguity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Catalog identifier of the candidate.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Match score in 0..=1, higher is better.
    pub score: f64,
    /// Catalog unit price, carried for item candidates so a later user
    /// selection needs no second catalog round-trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
}

// ============================================================================
// SECTION: Customer & Item Results
// ============================================================================

/// Result of matching the order's customer block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMatch {
    /// Classification.
    pub status: MatchStatus,
    /// Ranked candidates, best first.
    pub candidates: Vec<MatchCandidate>,
    /// Resolved customer id when `status` is `resolved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    /// Whether the result was served from a stale cache entry.
    #[serde(default)]
    pub stale_cache: bool,
}

/// Result of matching one order line against catalog items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMatch {
    /// Line number the result belongs to.
    pub line_number: u32,
    /// Classification.
    pub status: MatchStatus,
    /// Ranked candidates, best first.
    pub candidates: Vec<MatchCandidate>,
    /// Resolved item id when `status` is `resolved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    /// Catalog price of the resolved item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_price: Option<Money>,
    /// Whether the result was served from a stale cache entry.
    #[serde(default)]
    pub stale_cache: bool,
}

// ============================================================================
// SECTION: Price Audit
// ============================================================================

/// Comparison between the spreadsheet price and the catalog price.
///
/// # Invariants
/// - The catalog price always prevails on the submitted draft; the sheet
///   price is preserved untouched on the canonical order for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAudit {
    /// Line number the audit belongs to.
    pub line_number: u32,
    /// Unit price extracted from the spreadsheet, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_price: Option<Money>,
    /// Catalog unit price used on the draft.
    pub catalog_price: Money,
    /// Catalog minus sheet price in minor units (0 when no sheet price).
    pub difference_minor: i64,
}

impl PriceAudit {
    /// Builds the audit record for one resolved line.
    #[must_use]
    pub fn compare(line_number: u32, sheet_price: Option<Money>, catalog_price: Money) -> Self {
        let difference_minor =
            sheet_price.map_or(0, |sheet| catalog_price.minor() - sheet.minor());
        Self {
            line_number,
            sheet_price,
            catalog_price,
            difference_minor,
        }
    }
}
