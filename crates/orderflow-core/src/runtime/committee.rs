// crates/orderflow-core/src/runtime/committee.rs
// ============================================================================
// Module: Orderflow Committee Runtime
// Description: Provider selection, parallel fan-out, and weighted aggregation.
// Purpose: Produce a deterministic verdict from diverse model responses.
// Dependencies: crate::{core, interfaces}, jsonschema, serde_json
// ============================================================================

//! ## Overview
//! The committee picks N providers from the configured pool maximizing family
//! diversity, fans the identical evidence pack out in parallel, validates
//! each response (JSON, schema, column containment, field coverage), and
//! aggregates usable responses by weighted vote. Aggregation is deterministic
//! in the set of usable responses and the calibrated weights; arrival order
//! never affects the verdict because responses are processed in selection
//! order and ties break on column id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::OnceLock;
use std::thread;
use std::time::Instant;

use jsonschema::Draft;
use jsonschema::Validator;
use serde_json::Value;
use serde_json::json;

use crate::core::CRITICAL_FIELDS;
use crate::core::ColumnId;
use crate::core::CommitteeOutput;
use crate::core::CommitteeResponse;
use crate::core::CommitteeVerdict;
use crate::core::ConsensusClass;
use crate::core::Disagreement;
use crate::core::EvidencePack;
use crate::core::FieldDecision;
use crate::core::ProviderCallOutcome;
use crate::core::ProviderSpec;
use crate::core::Sha256Digest;
use crate::core::identifiers::ProviderId;
use crate::interfaces::ModelProvider;
use crate::interfaces::ProviderError;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Committee behavior configuration.
///
/// # Invariants
/// - `min_usable <= n <= pool size` is validated by the config crate.
/// - `margin_threshold` compares against the field margin itself: winner
///   vote strength minus runner-up vote strength (0 when unopposed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitteeConfig {
    /// Number of providers selected per round.
    pub n: usize,
    /// Minimum usable responses below which the verdict is `no_consensus`.
    pub min_usable: usize,
    /// Margin (winner minus runner-up vote strength) below which a field
    /// forces human review.
    pub margin_threshold: f64,
    /// Overall confidence below which the verdict forces human review.
    pub confidence_threshold: f64,
    /// Dissent strength (weight x confidence) above which consensus is
    /// `split` even on non-critical fields.
    pub dissent_min_strength: f64,
    /// Maximum sample values per candidate column in the evidence pack.
    pub sample_cap: usize,
    /// Overall round time budget in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CommitteeConfig {
    fn default() -> Self {
        Self {
            n: 3,
            min_usable: 2,
            margin_threshold: 0.66,
            confidence_threshold: 0.75,
            dissent_min_strength: 0.2,
            sample_cap: 5,
            timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// SECTION: Response Schema
// ============================================================================

/// Returns the compiled committee response schema.
///
/// The schema is the first validation gate; the strict `serde` decode is the
/// second. Both must pass for a response to be usable.
fn response_schema() -> &'static Validator {
    static SCHEMA: OnceLock<Validator> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let schema = json!({
            "type": "object",
            "required": ["mappings", "overallConfidence"],
            "additionalProperties": false,
            "properties": {
                "mappings": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["field", "selectedColumnId", "confidence", "reasoning"],
                        "additionalProperties": false,
                        "properties": {
                            "field": {"type": "string", "minLength": 1},
                            "selectedColumnId": {"type": "string", "minLength": 1},
                            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                            "reasoning": {"type": "string"}
                        }
                    }
                },
                "issues": {"type": "array", "items": {"type": "string"}},
                "overallConfidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
            }
        });
        #[allow(
            clippy::expect_used,
            reason = "The schema is a compile-time constant; failure is a build defect."
        )]
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .expect("committee response schema must compile");
        validator
    })
}

// ============================================================================
// SECTION: Committee
// ============================================================================

/// One pool entry pairing the declared spec with its implementation.
#[derive(Clone)]
pub struct PoolEntry {
    /// Declared provider spec (id, family, weight, budget).
    pub spec: ProviderSpec,
    /// Provider implementation.
    pub provider: Arc<dyn ModelProvider>,
}

/// Committee coordinator.
pub struct Committee {
    /// Provider pool in configured order.
    pool: Vec<PoolEntry>,
    /// Behavior configuration.
    config: CommitteeConfig,
}

impl Committee {
    /// Creates a committee over the configured pool.
    #[must_use]
    pub fn new(pool: Vec<PoolEntry>, config: CommitteeConfig) -> Self {
        Self {
            pool,
            config,
        }
    }

    /// Returns the behavior configuration.
    #[must_use]
    pub const fn config(&self) -> &CommitteeConfig {
        &self.config
    }

    /// Selects exactly N pool entries maximizing family diversity.
    ///
    /// Pool order is preserved; a family repeats only once every unused
    /// family is exhausted, so the selection is deterministic in the
    /// configured pool.
    #[must_use]
    pub fn select(&self) -> Vec<&PoolEntry> {
        let n = self.config.n.min(self.pool.len());
        let mut chosen: Vec<&PoolEntry> = Vec::with_capacity(n);
        let mut used_families = BTreeSet::new();
        let mut used_ids = BTreeSet::new();

        for entry in &self.pool {
            if chosen.len() == n {
                break;
            }
            if used_families.insert(entry.spec.family.clone()) {
                used_ids.insert(entry.spec.id.clone());
                chosen.push(entry);
            }
        }
        for entry in &self.pool {
            if chosen.len() == n {
                break;
            }
            if used_ids.insert(entry.spec.id.clone()) {
                chosen.push(entry);
            }
        }
        chosen
    }

    /// Builds the language-aware prompt for an evidence pack.
    #[must_use]
    pub fn build_prompt(&self, pack: &EvidencePack) -> String {
        let rtl = pack
            .language
            .as_deref()
            .is_some_and(|lang| lang.starts_with("ar") || lang.starts_with("he"));
        let mut prompt = String::new();
        if rtl {
            prompt.push_str(
                "You are reviewing a sales-order spreadsheet whose content reads right-to-left. \
                 Answer in English JSON only.\n",
            );
        } else {
            prompt.push_str("You are reviewing a sales-order spreadsheet extraction.\n");
        }
        prompt.push_str(
            "Map each canonical field to exactly one candidate column id. Respond with JSON \
             matching {\"mappings\":[{\"field\",\"selectedColumnId\",\"confidence\",\"reasoning\"}],\
             \"issues\":[],\"overallConfidence\"}. Use only the listed column ids.\n",
        );
        prompt.push_str("Canonical fields: ");
        prompt.push_str(&pack.expected_fields.join(", "));
        prompt.push('\n');
        if !pack.pinned.is_empty() {
            prompt.push_str("Hard constraints (already confirmed by the user):\n");
            for (field, column) in &pack.pinned {
                prompt.push_str(&format!("  {field} -> {column}\n"));
            }
        }
        prompt.push_str("Candidate columns:\n");
        for candidate in &pack.candidates {
            let header = candidate.header.as_deref().unwrap_or("(no header)");
            prompt.push_str(&format!(
                "  {}: header={header} samples=[{}] non_empty={} numeric={} distinct={}\n",
                candidate.column_id,
                candidate.samples.join(" | "),
                candidate.stats.non_empty,
                candidate.stats.numeric,
                candidate.stats.distinct
            ));
        }
        prompt
    }

    /// Runs one committee round: fan-out, validation, and aggregation.
    ///
    /// Returns every provider's call record plus the aggregated verdict.
    #[must_use]
    pub fn run(&self, pack: &EvidencePack) -> (Vec<CommitteeOutput>, CommitteeVerdict) {
        let selected = self.select();
        let prompt = self.build_prompt(pack);
        let prompt_sha256 = Sha256Digest::of_bytes(prompt.as_bytes());

        let mut outputs: Vec<CommitteeOutput> = thread::scope(|scope| {
            let handles: Vec<_> = selected
                .iter()
                .map(|entry| {
                    let prompt = prompt.as_str();
                    let budget = entry.spec.time_budget_ms.min(self.config.timeout_ms);
                    scope.spawn(move || {
                        let started = Instant::now();
                        let result = entry.provider.invoke(prompt, budget);
                        let latency_ms =
                            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                        (result, latency_ms)
                    })
                })
                .collect();
            handles
                .into_iter()
                .zip(selected.iter())
                .map(|(handle, entry)| {
                    let (result, latency_ms) = match handle.join() {
                        Ok(outcome) => outcome,
                        Err(_) => (Err(ProviderError::Transport("provider panicked".to_string())), 0),
                    };
                    build_output(entry, &prompt_sha256, pack, result, latency_ms)
                })
                .collect()
        });
        outputs.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));

        let verdict = self.aggregate(pack, &outputs);
        (outputs, verdict)
    }

    /// Aggregates usable outputs into the verdict.
    #[allow(
        clippy::too_many_lines,
        reason = "Keep the voting, classification, and needs_human rules in one linear pass."
    )]
    fn aggregate(&self, pack: &EvidencePack, outputs: &[CommitteeOutput]) -> CommitteeVerdict {
        let usable: Vec<(&CommitteeOutput, &CommitteeResponse)> = outputs
            .iter()
            .filter_map(|output| output.response.as_ref().map(|response| (output, response)))
            .collect();
        let usable_providers: Vec<ProviderId> =
            usable.iter().map(|(output, _)| output.provider_id.clone()).collect();

        let overall_confidence = if usable.is_empty() {
            0.0
        } else {
            usable.iter().map(|(_, r)| r.overall_confidence).sum::<f64>() / usable.len() as f64
        };

        if usable.len() < self.config.min_usable {
            let disagreements = pack
                .expected_fields
                .iter()
                .map(|field| field_disagreement(field, &usable))
                .collect();
            return CommitteeVerdict {
                consensus: ConsensusClass::NoConsensus,
                decisions: Vec::new(),
                disagreements,
                needs_human: true,
                overall_confidence,
                usable_providers,
            };
        }

        let mut decisions = Vec::new();
        let mut disagreements = Vec::new();
        let mut any_no_majority = false;
        let mut any_dissent = false;
        let mut critical_dissent = false;
        let mut strong_dissent = false;
        let mut low_margin = false;

        for field in &pack.expected_fields {
            // strength per column, deterministic in column order
            let mut strengths: BTreeMap<&ColumnId, f64> = BTreeMap::new();
            let mut counts: BTreeMap<&ColumnId, usize> = BTreeMap::new();
            for (output, response) in &usable {
                for mapping in &response.mappings {
                    if &mapping.field == field {
                        *strengths.entry(&mapping.selected_column_id).or_insert(0.0) +=
                            output.weight * mapping.confidence;
                        *counts.entry(&mapping.selected_column_id).or_insert(0) += 1;
                    }
                }
            }
            let Some((winner, winner_strength)) = strengths
                .iter()
                .map(|(column, strength)| (*column, *strength))
                .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            else {
                any_no_majority = true;
                continue;
            };
            let runner_up = strengths
                .iter()
                .filter(|(column, _)| **column != winner)
                .map(|(_, strength)| *strength)
                .fold(0.0_f64, f64::max);
            let margin = winner_strength - runner_up;

            let winner_count = counts.get(winner).copied().unwrap_or(0);
            let dissenting = strengths.len() > 1;
            let is_critical = CRITICAL_FIELDS.contains(&field.as_str());

            if winner_count * 2 <= usable.len() {
                any_no_majority = true;
            }
            if dissenting {
                any_dissent = true;
                if is_critical {
                    critical_dissent = true;
                }
                if runner_up >= self.config.dissent_min_strength {
                    strong_dissent = true;
                }
                disagreements.push(field_disagreement(field, &usable));
            }
            if margin < self.config.margin_threshold {
                low_margin = true;
            }

            decisions.push(FieldDecision {
                field: field.clone(),
                column_id: winner.clone(),
                vote_strength: winner_strength,
                margin,
            });
        }

        let consensus = if any_no_majority {
            ConsensusClass::NoConsensus
        } else if !any_dissent {
            ConsensusClass::Unanimous
        } else if critical_dissent || strong_dissent {
            ConsensusClass::Split
        } else {
            ConsensusClass::Majority
        };

        let needs_human = matches!(consensus, ConsensusClass::Split | ConsensusClass::NoConsensus)
            || low_margin
            || overall_confidence < self.config.confidence_threshold
            || critical_dissent;

        CommitteeVerdict {
            consensus,
            decisions,
            disagreements,
            needs_human,
            overall_confidence,
            usable_providers,
        }
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Builds the call record for one provider result.
fn build_output(
    entry: &PoolEntry,
    prompt_sha256: &Sha256Digest,
    pack: &EvidencePack,
    result: Result<String, ProviderError>,
    latency_ms: u64,
) -> CommitteeOutput {
    let (raw_response, outcome, response) = match result {
        Ok(raw) => {
            let (outcome, response) = validate_response(&raw, pack);
            (raw, outcome, response)
        }
        Err(ProviderError::Timeout(_)) => (String::new(), ProviderCallOutcome::Timeout, None),
        Err(ProviderError::Transport(detail)) => {
            (detail, ProviderCallOutcome::TransportError, None)
        }
    };
    CommitteeOutput {
        provider_id: entry.spec.id.clone(),
        family: entry.spec.family.clone(),
        prompt_sha256: prompt_sha256.clone(),
        response,
        raw_response,
        weight: entry.spec.weight,
        latency_ms,
        outcome,
    }
}

/// Validates a raw response body against the usability gates.
fn validate_response(raw: &str, pack: &EvidencePack) -> (ProviderCallOutcome, Option<CommitteeResponse>) {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return (ProviderCallOutcome::InvalidJson, None);
    };
    if !response_schema().is_valid(&value) {
        return (ProviderCallOutcome::SchemaViolation, None);
    }
    let Ok(response) = serde_json::from_value::<CommitteeResponse>(value) else {
        return (ProviderCallOutcome::SchemaViolation, None);
    };

    let known: BTreeSet<&ColumnId> = pack.candidates.iter().map(|c| &c.column_id).collect();
    if response.mappings.iter().any(|mapping| !known.contains(&mapping.selected_column_id)) {
        return (ProviderCallOutcome::UnknownColumn, None);
    }

    let covered: BTreeSet<&str> =
        response.mappings.iter().map(|mapping| mapping.field.as_str()).collect();
    if pack.expected_fields.iter().any(|field| !covered.contains(field.as_str())) {
        return (ProviderCallOutcome::MissingField, None);
    }

    (ProviderCallOutcome::Usable, Some(response))
}

/// Builds the disagreement record for one field from usable responses.
fn field_disagreement(
    field: &str,
    usable: &[(&CommitteeOutput, &CommitteeResponse)],
) -> Disagreement {
    let mut votes = BTreeMap::new();
    let mut strengths: BTreeMap<ColumnId, f64> = BTreeMap::new();
    for (output, response) in usable {
        for mapping in &response.mappings {
            if mapping.field == field {
                votes.insert(output.provider_id.clone(), mapping.selected_column_id.clone());
                *strengths.entry(mapping.selected_column_id.clone()).or_insert(0.0) +=
                    output.weight * mapping.confidence;
            }
        }
    }
    let mut competing: Vec<ColumnId> = strengths.keys().cloned().collect();
    competing.sort_by(|a, b| {
        strengths
            .get(b)
            .unwrap_or(&0.0)
            .total_cmp(strengths.get(a).unwrap_or(&0.0))
            .then_with(|| a.cmp(b))
    });
    Disagreement {
        field: field.to_string(),
        competing,
        votes,
    }
}
