// crates/orderflow-providers/tests/registry.rs
// ============================================================================
// Module: Provider Registry Tests
// Description: Pool assembly from declared entries and weights.
// Purpose: Validate constructor mapping and weight application.
// Dependencies: orderflow-providers
// ============================================================================
//! ## Overview
//! Entries with endpoints become HTTP providers, entries without become
//! fixture providers, calibrated weights supersede declared ones, and a bad
//! endpoint fails assembly wholesale.

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

use orderflow_config::ProviderEntry;
use orderflow_config::WeightsSnapshot;
use orderflow_providers::HttpProviderConfig;
use orderflow_providers::build_pool;

/// Builds one declared entry.
fn entry(id: &str, endpoint: Option<&str>) -> ProviderEntry {
    ProviderEntry {
        id: id.to_string(),
        family: "test".to_string(),
        weight: 1.0,
        time_budget_ms: 1_000,
        endpoint: endpoint.map(ToString::to_string),
    }
}

/// Verifies mixed pools assemble with declared order preserved.
#[test]
fn mixed_pool_assembles_in_order() {
    let entries = vec![
        entry("http-1", Some("https://models.internal/a")),
        entry("fixture-1", None),
    ];
    let pool =
        build_pool(&entries, &WeightsSnapshot::default(), &HttpProviderConfig::default()).unwrap();
    assert_eq!(pool.len(), 2);
    assert_eq!(pool[0].spec.id.as_str(), "http-1");
    assert_eq!(pool[1].spec.id.as_str(), "fixture-1");
}

/// Verifies a malformed endpoint fails assembly wholesale.
#[test]
fn bad_endpoint_fails_assembly() {
    let entries = vec![entry("bad-1", Some("not a url"))];
    assert!(
        build_pool(&entries, &WeightsSnapshot::default(), &HttpProviderConfig::default()).is_err()
    );
}

/// Verifies declared weights survive when no calibration is present.
#[test]
fn declared_weight_survives_without_calibration() {
    let mut declared = entry("fixture-1", None);
    declared.weight = 0.4;
    let pool = build_pool(&[declared], &WeightsSnapshot::default(), &HttpProviderConfig::default())
        .unwrap();
    assert!((pool[0].spec.weight - 0.4).abs() < 1e-9);
}
