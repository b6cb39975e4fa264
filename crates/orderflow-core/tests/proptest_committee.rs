// crates/orderflow-core/tests/proptest_committee.rs
// ============================================================================
// Module: Committee Property Tests
// Description: Aggregation determinism and verdict invariants under fuzzing.
// Purpose: Hold the voting laws over arbitrary confidences and weights.
// Dependencies: orderflow-core, proptest
// ============================================================================
//! ## Overview
//! For arbitrary provider weights, confidences, and column choices: running
//! the committee twice yields the identical verdict; margins never exceed
//! winner strength; split and no-consensus verdicts always demand a human
//! and carry disagreements.

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

use std::collections::BTreeMap;
use std::sync::Arc;

use common::ScriptedProvider;
use orderflow_core::ColumnCandidate;
use orderflow_core::ColumnStats;
use orderflow_core::Committee;
use orderflow_core::CommitteeConfig;
use orderflow_core::ConsensusClass;
use orderflow_core::EvidencePack;
use orderflow_core::PoolEntry;
use orderflow_core::ProviderFamily;
use orderflow_core::ProviderId;
use orderflow_core::ProviderSpec;
use proptest::prelude::proptest;
use proptest::prop_assert;
use proptest::prop_assert_eq;

/// Builds the committee for generated (column, confidence, weight) triples.
fn committee_for(votes: &[(u8, f64, f64)]) -> Committee {
    let families = ["alpha", "beta", "gamma", "delta", "epsilon"];
    let pool: Vec<PoolEntry> = votes
        .iter()
        .enumerate()
        .map(|(index, (column, confidence, weight))| {
            let column = format!("c{}", column % 3 + 1);
            let confidence = *confidence;
            let body = serde_json::json!({
                "mappings": [{
                    "field": "sku",
                    "selectedColumnId": column,
                    "confidence": confidence,
                    "reasoning": "generated",
                }],
                "issues": [],
                "overallConfidence": confidence,
            })
            .to_string();
            PoolEntry {
                spec: ProviderSpec {
                    id: ProviderId::new(format!("p-{index}")),
                    family: ProviderFamily::new(families[index % families.len()]),
                    weight: *weight,
                    time_budget_ms: 1_000,
                },
                provider: Arc::new(ScriptedProvider {
                    id: ProviderId::new(format!("p-{index}")),
                    family: ProviderFamily::new(families[index % families.len()]),
                    respond: Box::new(move |_| body.clone()),
                }),
            }
        })
        .collect();
    Committee::new(pool, CommitteeConfig::default())
}

/// Single-field pack over three columns.
fn pack() -> EvidencePack {
    EvidencePack {
        candidates: ["c1", "c2", "c3"]
            .iter()
            .map(|id| ColumnCandidate {
                column_id: (*id).into(),
                header: None,
                samples: Vec::new(),
                stats: ColumnStats::default(),
            })
            .collect(),
        expected_fields: vec!["sku".to_string()],
        language: None,
        pinned: BTreeMap::new(),
    }
}

proptest! {
    /// Running the same committee twice yields the identical verdict.
    #[test]
    fn aggregation_is_deterministic(
        votes in proptest::collection::vec((0_u8..3, 0.0_f64..=1.0, 0.1_f64..=2.0), 3..=5),
    ) {
        let committee = committee_for(&votes);
        let (_, first) = committee.run(&pack());
        let (_, second) = committee.run(&pack());
        prop_assert_eq!(first, second);
    }

    /// Margins never exceed winner strength; strengths are non-negative.
    #[test]
    fn margins_are_bounded_by_strength(
        votes in proptest::collection::vec((0_u8..3, 0.0_f64..=1.0, 0.1_f64..=2.0), 3..=5),
    ) {
        let committee = committee_for(&votes);
        let (_, verdict) = committee.run(&pack());
        for decision in &verdict.decisions {
            prop_assert!(decision.vote_strength >= 0.0);
            prop_assert!(decision.margin <= decision.vote_strength + 1e-9);
            prop_assert!(decision.margin >= 0.0);
        }
    }

    /// Split and no-consensus verdicts demand a human with disagreements.
    #[test]
    fn contested_verdicts_demand_human(
        votes in proptest::collection::vec((0_u8..3, 0.0_f64..=1.0, 0.1_f64..=2.0), 3..=5),
    ) {
        let committee = committee_for(&votes);
        let (_, verdict) = committee.run(&pack());
        if matches!(verdict.consensus, ConsensusClass::Split | ConsensusClass::NoConsensus) {
            prop_assert!(verdict.needs_human);
        }
        if verdict.consensus != ConsensusClass::Unanimous {
            prop_assert!(!verdict.disagreements.is_empty());
        }
    }
}
