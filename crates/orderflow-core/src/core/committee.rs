// crates/orderflow-core/src/core/committee.rs
// ============================================================================
// Module: Orderflow Committee Model
// Description: Evidence packs, provider outputs, and aggregated verdicts.
// Purpose: Define the contract between the engine and the review committee.
// Dependencies: crate::core::{hashing, identifiers}, serde
// ============================================================================

//! ## Overview
//! The committee cross-checks the parser's field-to-column mapping by fanning
//! an identical evidence pack out to several model providers and aggregating
//! their structured responses by weighted vote. This module holds the value
//! types; the aggregation algorithm lives in [`crate::runtime::committee`].
//! Responses are strict-schema JSON: unknown fields, unknown column ids, and
//! missing canonical fields all disqualify a response before aggregation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::Sha256Digest;
use crate::core::identifiers::ColumnId;
use crate::core::identifiers::ProviderFamily;
use crate::core::identifiers::ProviderId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Canonical fields whose disagreement always forces human review.
pub const CRITICAL_FIELDS: [&str; 3] = ["customer", "sku", "gtin"];

// ============================================================================
// SECTION: Evidence Pack
// ============================================================================

/// Summary statistics for one candidate column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Number of non-empty cells.
    pub non_empty: u32,
    /// Number of numeric-looking cells.
    pub numeric: u32,
    /// Number of distinct values.
    pub distinct: u32,
}

/// One candidate column offered to the committee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCandidate {
    /// Column identifier from the parser.
    pub column_id: ColumnId,
    /// Header text, when a header row was detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Redacted sample values, capped at the configured sample count.
    pub samples: Vec<String>,
    /// Column statistics.
    pub stats: ColumnStats,
}

/// Evidence pack fanned out identically to every selected provider.
///
/// # Invariants
/// - `candidates[*].samples` are capped and redacted before the pack is
///   built; no secret-resembling values may appear.
/// - `expected_fields` lists every canonical field a usable response must
///   cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePack {
    /// Candidate columns with samples and statistics.
    pub candidates: Vec<ColumnCandidate>,
    /// Canonical fields to map.
    pub expected_fields: Vec<String>,
    /// Detected language hint (BCP 47), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Hard constraints the mapping must honor (user-pinned columns).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pinned: BTreeMap<String, ColumnId>,
}

// ============================================================================
// SECTION: Provider Pool
// ============================================================================

/// Configuration-declared committee provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Provider identifier.
    pub id: ProviderId,
    /// Family tag used for diversity selection.
    pub family: ProviderFamily,
    /// Calibrated vote weight; 1.0 unless offline calibration says otherwise.
    pub weight: f64,
    /// Per-call time budget in milliseconds.
    pub time_budget_ms: u64,
}

// ============================================================================
// SECTION: Provider Responses
// ============================================================================

/// One per-field mapping decision inside a provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldMapping {
    /// Canonical field being mapped.
    pub field: String,
    /// Column chosen for the field.
    #[serde(rename = "selectedColumnId")]
    pub selected_column_id: ColumnId,
    /// Provider confidence for this field, 0..=1.
    pub confidence: f64,
    /// Brief reasoning for the choice.
    pub reasoning: String,
}

/// Schema-validated provider response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitteeResponse {
    /// Per-field mapping decisions.
    pub mappings: Vec<FieldMapping>,
    /// Free-text issues the provider wants to surface.
    #[serde(default)]
    pub issues: Vec<String>,
    /// Overall confidence, 0..=1.
    #[serde(rename = "overallConfidence")]
    pub overall_confidence: f64,
}

/// Terminal outcome of one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCallOutcome {
    /// Response parsed, validated, and accepted for aggregation.
    Usable,
    /// Response was not valid JSON.
    InvalidJson,
    /// Response violated the committee response schema.
    SchemaViolation,
    /// Response referenced a column id outside the candidate set.
    UnknownColumn,
    /// Response failed to cover every expected field.
    MissingField,
    /// Provider exceeded its time budget.
    Timeout,
    /// Transport-level failure reaching the provider.
    TransportError,
}

/// Full record of one provider invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeOutput {
    /// Provider identifier.
    pub provider_id: ProviderId,
    /// Provider family.
    pub family: ProviderFamily,
    /// Digest of the prompt sent to the provider.
    pub prompt_sha256: Sha256Digest,
    /// Validated response, present only for usable calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CommitteeResponse>,
    /// Raw response body as returned by the provider.
    pub raw_response: String,
    /// Calibrated weight applied during aggregation.
    pub weight: f64,
    /// Wall-clock latency of the call in milliseconds.
    pub latency_ms: u64,
    /// Call outcome.
    pub outcome: ProviderCallOutcome,
}

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Consensus classification over all fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusClass {
    /// Every field's winner was voted by all usable responses, no dissent.
    Unanimous,
    /// Strict majority per field and no dissent on critical fields.
    Majority,
    /// Meaningful dissent on some field, or any dissent on a critical field.
    Split,
    /// Too few usable responses, or some field without a majority.
    NoConsensus,
}

/// Final decision for one canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecision {
    /// Canonical field.
    pub field: String,
    /// Winning column.
    pub column_id: ColumnId,
    /// Total vote strength behind the winner.
    pub vote_strength: f64,
    /// Winner strength minus runner-up strength (0 when unopposed).
    pub margin: f64,
}

/// Recorded disagreement for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disagreement {
    /// Canonical field under dispute.
    pub field: String,
    /// Competing columns, strongest first.
    pub competing: Vec<ColumnId>,
    /// Which provider voted for which column.
    pub votes: BTreeMap<ProviderId, ColumnId>,
}

/// Aggregated committee verdict.
///
/// # Invariants
/// - `needs_human` is true whenever consensus is `split`/`no_consensus`, any
///   margin is below the configured threshold, overall confidence is below
///   the configured threshold, or a critical field has dissent.
/// - A verdict with consensus other than `unanimous` carries a non-empty
///   `disagreements` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeVerdict {
    /// Consensus classification.
    pub consensus: ConsensusClass,
    /// Final per-field decisions.
    pub decisions: Vec<FieldDecision>,
    /// Ordered disagreement list, most contested first.
    pub disagreements: Vec<Disagreement>,
    /// Whether human review is required before the pipeline continues.
    pub needs_human: bool,
    /// Averaged overall confidence across usable responses.
    pub overall_confidence: f64,
    /// Providers whose responses were usable.
    pub usable_providers: Vec<ProviderId>,
}
