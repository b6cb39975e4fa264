// crates/orderflow-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load & Validation Tests
// Description: Strict parsing, limits, overrides, and the example round-trip.
// Purpose: Validate fail-closed configuration semantics.
// Dependencies: orderflow-config, tempfile
// ============================================================================
//! ## Overview
//! Unknown keys fail at parse time; validation enforces pool, threshold, and
//! retention limits; overrides parse the documented variable shapes; and the
//! generated example parses back to a valid configuration.

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

use std::collections::BTreeMap;
use std::io::Write;

use orderflow_config::CatalogRegion;
use orderflow_config::ConfigError;
use orderflow_config::FormulaPolicy;
use orderflow_config::OrderflowConfig;
use orderflow_config::ProviderEntry;
use orderflow_config::config_toml_example;
use orderflow_config::load_weights;
use orderflow_core::BucketGranularity;
use orderflow_core::ProviderSpec;

/// Returns a valid config with a three-provider pool.
fn valid_config() -> OrderflowConfig {
    let mut config = OrderflowConfig::default();
    config.committee.providers = vec![
        provider("a-1", "alpha"),
        provider("b-1", "beta"),
        provider("c-1", "gamma"),
    ];
    config
}

/// Builds one provider entry.
fn provider(id: &str, family: &str) -> ProviderEntry {
    ProviderEntry {
        id: id.to_string(),
        family: family.to_string(),
        weight: 1.0,
        time_budget_ms: 30_000,
        endpoint: None,
    }
}

/// Verifies the defaults validate once a pool is declared.
#[test]
fn defaults_with_pool_validate() {
    valid_config().validate().unwrap();
}

/// Verifies an empty pool fails closed.
#[test]
fn empty_pool_is_rejected() {
    let config = OrderflowConfig::default();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

/// Verifies unknown keys are rejected at parse time.
#[test]
fn unknown_keys_are_rejected() {
    let text = "[workflow]\ntask_queue = \"q\"\nunknown_key = 1\n";
    let parsed: Result<OrderflowConfig, _> = toml::from_str(text);
    assert!(parsed.is_err());
}

/// Verifies retention below the floor is rejected.
#[test]
fn short_retention_is_rejected() {
    let mut config = valid_config();
    config.retention.days_audit = 30;
    assert!(config.validate().is_err());
}

/// Verifies n larger than the pool is rejected.
#[test]
fn committee_n_beyond_pool_is_rejected() {
    let mut config = valid_config();
    config.committee.n = 4;
    assert!(config.validate().is_err());
}

/// Verifies duplicate provider ids are rejected.
#[test]
fn duplicate_provider_ids_are_rejected() {
    let mut config = valid_config();
    config.committee.providers.push(provider("a-1", "delta"));
    assert!(config.validate().is_err());
}

/// Verifies threshold bounds.
#[test]
fn out_of_range_thresholds_are_rejected() {
    let mut config = valid_config();
    config.matcher.fuzzy_threshold = 1.5;
    assert!(config.validate().is_err());
}

/// Verifies run timeout cannot exceed the execution timeout.
#[test]
fn run_timeout_beyond_execution_is_rejected() {
    let text = "[workflow]\nexecution_timeout = \"1h\"\nrun_timeout = \"2h\"\n";
    let mut config: OrderflowConfig = toml::from_str(text).unwrap();
    config.committee.providers = vec![provider("a-1", "alpha")];
    config.committee.n = 1;
    config.committee.min_usable = 1;
    assert!(config.validate().is_err());
}

/// Verifies the documented override variables parse and apply.
#[test]
fn overrides_apply_from_lookup() {
    let mut values = BTreeMap::new();
    values.insert("WORKFLOW_TASK_QUEUE", "orders-eu");
    values.insert("WORKFLOW_EXECUTION_TIMEOUT", "48h");
    values.insert("ACTIVITY_MAX_CONCURRENCY", "8");
    values.insert("COMMITTEE_N", "2");
    values.insert("COMMITTEE_MIN_USABLE", "2");
    values.insert("COMMITTEE_POOL", "c-1, a-1");
    values.insert("MATCHER_FUZZY_THRESHOLD", "0.8");
    values.insert("PARSER_FORMULA_POLICY", "lenient");
    values.insert("CATALOG_REGION", "AU");
    values.insert("FINGERPRINT_BUCKET_GRANULARITY", "week");

    let mut config = valid_config();
    config
        .apply_overrides_from(&|name| values.get(name).map(ToString::to_string))
        .unwrap();

    assert_eq!(config.workflow.task_queue, "orders-eu");
    assert_eq!(config.workflow.execution_timeout.as_duration().as_secs(), 48 * 3_600);
    assert_eq!(config.workflow.activity_max_concurrency, 8);
    assert_eq!(config.committee.n, 2);
    // The pool override reorders and filters the declared providers.
    let ids: Vec<&str> =
        config.committee.providers.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, ["c-1", "a-1"]);
    assert!((config.matcher.fuzzy_threshold - 0.8).abs() < 1e-9);
    assert_eq!(config.parser.formula_policy, FormulaPolicy::Lenient);
    assert_eq!(config.catalog.region, CatalogRegion::Au);
    assert_eq!(config.fingerprint.bucket_granularity, BucketGranularity::Week);
    config.validate().unwrap();
}

/// Verifies an override naming an undeclared provider fails.
#[test]
fn pool_override_with_unknown_provider_fails() {
    let mut config = valid_config();
    let result = config.apply_overrides_from(&|name| {
        (name == "COMMITTEE_POOL").then(|| "ghost-1".to_string())
    });
    assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
}

/// Verifies a malformed duration override fails with the variable name.
#[test]
fn malformed_duration_override_fails() {
    let mut config = valid_config();
    let result = config.apply_overrides_from(&|name| {
        (name == "WORKFLOW_RUN_TIMEOUT").then(|| "soon".to_string())
    });
    assert!(matches!(
        result,
        Err(ConfigError::InvalidEnv {
            variable: "WORKFLOW_RUN_TIMEOUT",
            ..
        })
    ));
}

/// Verifies the generated example parses back to a valid config.
#[test]
fn example_round_trips() {
    let example = config_toml_example();
    let parsed: OrderflowConfig = toml::from_str(&example).unwrap();
    parsed.validate().unwrap();
    assert_eq!(parsed.committee.providers.len(), 3);
    assert_eq!(parsed.workflow.task_queue, "order-processing");
}

/// Verifies weights files load, validate, and apply over declared specs.
#[test]
fn weights_snapshot_applies_over_specs() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{\"a-1\": 1.4, \"b-1\": 0.6}}").unwrap();
    let snapshot = load_weights(file.path()).unwrap();

    let config = valid_config();
    let specs: Vec<ProviderSpec> = snapshot.apply(config.provider_specs());
    assert!((specs[0].weight - 1.4).abs() < 1e-9);
    assert!((specs[1].weight - 0.6).abs() < 1e-9);
    assert!((specs[2].weight - 1.0).abs() < 1e-9);
}

/// Verifies non-positive weights are rejected.
#[test]
fn non_positive_weight_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{\"a-1\": 0.0}}").unwrap();
    assert!(load_weights(file.path()).is_err());
}
