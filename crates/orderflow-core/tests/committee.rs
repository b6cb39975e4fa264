// crates/orderflow-core/tests/committee.rs
// ============================================================================
// Module: Committee Tests
// Description: Selection, validation gates, voting, and consensus classes.
// Purpose: Validate deterministic aggregation over diverse providers.
// Dependencies: orderflow-core
// ============================================================================
//! ## Overview
//! Exercises family-diverse selection, the four usability gates, weighted
//! voting with margins, and the consensus/needs_human classification rules.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use common::ScriptedProvider;
use orderflow_core::ColumnCandidate;
use orderflow_core::ColumnStats;
use orderflow_core::Committee;
use orderflow_core::CommitteeConfig;
use orderflow_core::ConsensusClass;
use orderflow_core::EvidencePack;
use orderflow_core::PoolEntry;
use orderflow_core::ProviderCallOutcome;
use orderflow_core::ProviderFamily;
use orderflow_core::ProviderId;
use orderflow_core::ProviderSpec;

/// Builds a pool entry answering with a fixed body.
fn entry(id: &str, family: &str, weight: f64, body: String) -> PoolEntry {
    PoolEntry {
        spec: ProviderSpec {
            id: ProviderId::new(id),
            family: ProviderFamily::new(family),
            weight,
            time_budget_ms: 1_000,
        },
        provider: Arc::new(ScriptedProvider {
            id: ProviderId::new(id),
            family: ProviderFamily::new(family),
            respond: Box::new(move |_| body.clone()),
        }),
    }
}

/// Minimal single-field pack over columns `c1`/`c2`.
fn pack(fields: &[&str]) -> EvidencePack {
    EvidencePack {
        candidates: ["c1", "c2"]
            .iter()
            .map(|id| ColumnCandidate {
                column_id: (*id).into(),
                header: Some((*id).to_string()),
                samples: vec!["x".to_string()],
                stats: ColumnStats::default(),
            })
            .collect(),
        expected_fields: fields.iter().map(ToString::to_string).collect(),
        language: None,
        pinned: std::collections::BTreeMap::new(),
    }
}

/// One-field response body.
fn single_field(field: &str, column: &str, confidence: f64) -> String {
    serde_json::json!({
        "mappings": [{
            "field": field,
            "selectedColumnId": column,
            "confidence": confidence,
            "reasoning": "test",
        }],
        "issues": [],
        "overallConfidence": confidence,
    })
    .to_string()
}

/// One-field response body with distinct mapping and overall confidences.
fn single_field_with_overall(
    field: &str,
    column: &str,
    confidence: f64,
    overall: f64,
) -> String {
    serde_json::json!({
        "mappings": [{
            "field": field,
            "selectedColumnId": column,
            "confidence": confidence,
            "reasoning": "test",
        }],
        "issues": [],
        "overallConfidence": overall,
    })
    .to_string()
}

/// Verifies selection never repeats a family while one is unused.
#[test]
fn selection_maximizes_family_diversity() {
    let pool = vec![
        entry("a-1", "alpha", 1.0, single_field("sku", "c1", 0.9)),
        entry("a-2", "alpha", 1.0, single_field("sku", "c1", 0.9)),
        entry("b-1", "beta", 1.0, single_field("sku", "c1", 0.9)),
        entry("c-1", "gamma", 1.0, single_field("sku", "c1", 0.9)),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let selected: Vec<String> =
        committee.select().iter().map(|e| e.spec.id.to_string()).collect();
    assert_eq!(selected, ["a-1", "b-1", "c-1"]);
}

/// Verifies a family repeats once every family is used.
#[test]
fn selection_falls_back_to_used_families() {
    let pool = vec![
        entry("a-1", "alpha", 1.0, single_field("sku", "c1", 0.9)),
        entry("a-2", "alpha", 1.0, single_field("sku", "c1", 0.9)),
        entry("b-1", "beta", 1.0, single_field("sku", "c1", 0.9)),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let selected: Vec<String> =
        committee.select().iter().map(|e| e.spec.id.to_string()).collect();
    assert_eq!(selected, ["a-1", "b-1", "a-2"]);
}

/// Verifies the four usability gates record the right outcomes.
#[test]
fn unusable_responses_are_rejected_before_aggregation() {
    let pool = vec![
        entry("a-1", "alpha", 1.0, "not json at all".to_string()),
        entry(
            "b-1",
            "beta",
            1.0,
            serde_json::json!({
                "mappings": [],
                "extra": true,
                "overallConfidence": 0.9,
            })
            .to_string(),
        ),
        entry("c-1", "gamma", 1.0, single_field("sku", "c9", 0.9)),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let (outputs, verdict) = committee.run(&pack(&["sku"]));

    let outcome_of = |id: &str| {
        outputs
            .iter()
            .find(|output| output.provider_id.as_str() == id)
            .unwrap()
            .outcome
    };
    assert_eq!(outcome_of("a-1"), ProviderCallOutcome::InvalidJson);
    assert_eq!(outcome_of("b-1"), ProviderCallOutcome::SchemaViolation);
    assert_eq!(outcome_of("c-1"), ProviderCallOutcome::UnknownColumn);

    // Zero usable responses: no consensus, human required.
    assert_eq!(verdict.consensus, ConsensusClass::NoConsensus);
    assert!(verdict.needs_human);
    assert!(!verdict.disagreements.is_empty());
}

/// Verifies a response missing an expected field is unusable.
#[test]
fn missing_field_coverage_is_rejected() {
    let pool = vec![
        entry("a-1", "alpha", 1.0, single_field("sku", "c1", 0.9)),
        entry("b-1", "beta", 1.0, single_field("sku", "c1", 0.9)),
        entry("c-1", "gamma", 1.0, single_field("sku", "c1", 0.9)),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let (outputs, _) = committee.run(&pack(&["sku", "gtin"]));
    assert!(outputs.iter().all(|output| output.outcome == ProviderCallOutcome::MissingField));
}

/// Verifies weighted voting picks the heavier column and reports margins.
#[test]
fn weighted_vote_picks_strongest_column() {
    let pool = vec![
        entry("a-1", "alpha", 2.0, single_field("quantity", "c2", 0.9)),
        entry("b-1", "beta", 1.0, single_field("quantity", "c1", 0.9)),
        entry("c-1", "gamma", 1.0, single_field("quantity", "c1", 0.9)),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let (_, verdict) = committee.run(&pack(&["quantity"]));

    let decision = &verdict.decisions[0];
    // 2.0 x 0.9 = 1.8 for c2 versus 1.0 x 0.9 x 2 = 1.8 for c1: tie breaks
    // to the lexicographically smaller column id.
    assert_eq!(decision.column_id.as_str(), "c1");
    assert!(verdict.needs_human);
    assert!(!verdict.disagreements.is_empty());
}

/// Verifies the margin gate compares winner minus runner-up strength.
///
/// The dissenting vote stays below the split minimum and overall confidence
/// stays high, so the margin is the only gate in play. The first round's
/// margin is 0.9 - 0.19 = 0.71, clear of the 0.66 threshold even though the
/// margin divided by the total strength would not be; the second round's
/// 0.7 - 0.19 = 0.51 falls short and forces review.
#[test]
fn margin_threshold_uses_raw_margin() {
    let clear = vec![
        entry("a-1", "alpha", 1.0, single_field_with_overall("description", "c1", 0.45, 0.9)),
        entry("b-1", "beta", 1.0, single_field_with_overall("description", "c1", 0.45, 0.9)),
        entry("c-1", "gamma", 1.0, single_field_with_overall("description", "c2", 0.19, 0.9)),
    ];
    let committee = Committee::new(clear, CommitteeConfig::default());
    let (_, verdict) = committee.run(&pack(&["description"]));
    assert_eq!(verdict.consensus, ConsensusClass::Majority);
    assert!(verdict.decisions[0].margin > 0.66);
    assert!(!verdict.needs_human);

    let short = vec![
        entry("a-1", "alpha", 1.0, single_field_with_overall("description", "c1", 0.35, 0.9)),
        entry("b-1", "beta", 1.0, single_field_with_overall("description", "c1", 0.35, 0.9)),
        entry("c-1", "gamma", 1.0, single_field_with_overall("description", "c2", 0.19, 0.9)),
    ];
    let committee = Committee::new(short, CommitteeConfig::default());
    let (_, verdict) = committee.run(&pack(&["description"]));
    assert_eq!(verdict.consensus, ConsensusClass::Majority);
    assert!(verdict.decisions[0].margin < 0.66);
    assert!(verdict.needs_human);
}

/// Verifies unanimity without dissent and high confidence skips the human.
#[test]
fn unanimous_high_confidence_skips_human() {
    let pool = vec![
        entry("a-1", "alpha", 1.0, single_field("sku", "c1", 0.95)),
        entry("b-1", "beta", 1.0, single_field("sku", "c1", 0.95)),
        entry("c-1", "gamma", 1.0, single_field("sku", "c1", 0.95)),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let (_, verdict) = committee.run(&pack(&["sku"]));
    assert_eq!(verdict.consensus, ConsensusClass::Unanimous);
    assert!(!verdict.needs_human);
    assert!(verdict.disagreements.is_empty());
    assert_eq!(verdict.usable_providers.len(), 3);
}

/// Verifies critical-field dissent forces `split` and human review.
#[test]
fn critical_field_dissent_forces_split() {
    let pool = vec![
        entry("a-1", "alpha", 1.0, single_field("sku", "c1", 0.99)),
        entry("b-1", "beta", 1.0, single_field("sku", "c1", 0.99)),
        entry("c-1", "gamma", 1.0, single_field("sku", "c2", 0.99)),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let (_, verdict) = committee.run(&pack(&["sku"]));
    assert_eq!(verdict.consensus, ConsensusClass::Split);
    assert!(verdict.needs_human);
}

/// Verifies low overall confidence alone forces human review.
#[test]
fn low_confidence_forces_human() {
    let pool = vec![
        entry("a-1", "alpha", 1.0, single_field("description", "c1", 0.5)),
        entry("b-1", "beta", 1.0, single_field("description", "c1", 0.5)),
        entry("c-1", "gamma", 1.0, single_field("description", "c1", 0.5)),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let (_, verdict) = committee.run(&pack(&["description"]));
    assert_eq!(verdict.consensus, ConsensusClass::Unanimous);
    assert!(verdict.needs_human);
}

/// Verifies fewer usable responses than the minimum yields no consensus.
#[test]
fn below_minimum_usable_is_no_consensus() {
    let pool = vec![
        entry("a-1", "alpha", 1.0, single_field("sku", "c1", 0.95)),
        entry("b-1", "beta", 1.0, "garbage".to_string()),
        entry("c-1", "gamma", 1.0, "garbage".to_string()),
    ];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let (_, verdict) = committee.run(&pack(&["sku"]));
    assert_eq!(verdict.consensus, ConsensusClass::NoConsensus);
    assert!(verdict.needs_human);
    assert_eq!(verdict.usable_providers.len(), 1);
}

/// Verifies right-to-left language hints switch the prompt preamble.
#[test]
fn prompt_is_language_aware() {
    let pool = vec![entry("a-1", "alpha", 1.0, single_field("sku", "c1", 0.9))];
    let committee = Committee::new(pool, CommitteeConfig::default());
    let mut rtl_pack = pack(&["sku"]);
    rtl_pack.language = Some("he".to_string());
    let rtl_prompt = committee.build_prompt(&rtl_pack);
    assert!(rtl_prompt.contains("right-to-left"));

    let en_prompt = committee.build_prompt(&pack(&["sku"]));
    assert!(!en_prompt.contains("right-to-left"));
}
