// crates/orderflow-config/src/config.rs
// ============================================================================
// Module: Orderflow Configuration
// Description: Configuration loading and validation for the Orderflow worker.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: orderflow-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits, then
//! overlaid with the documented environment variables, then validated.
//! Missing or invalid configuration fails closed; unknown keys are rejected
//! at parse time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use orderflow_core::BucketGranularity;
use orderflow_core::CommitteeConfig;
use orderflow_core::EngineConfig;
use orderflow_core::MatcherConfig;
use orderflow_core::ProviderFamily;
use orderflow_core::ProviderId;
use orderflow_core::ProviderSpec;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "orderflow.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "ORDERFLOW_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Minimum retention for audit artifacts and originals, in days.
pub(crate) const MIN_RETENTION_DAYS: u32 = 1_825;
/// Maximum providers accepted in the committee pool.
pub(crate) const MAX_POOL_SIZE: usize = 32;
/// Maximum activity concurrency accepted.
pub(crate) const MAX_ACTIVITY_CONCURRENCY: usize = 1_024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file missing or unreadable.
    #[error("config file unreadable at {path}: {detail}")]
    Unreadable {
        /// Attempted path.
        path: PathBuf,
        /// Underlying detail.
        detail: String,
    },
    /// Config file exceeds the size limit.
    #[error("config file too large: {0} bytes")]
    TooLarge(u64),
    /// TOML parse failure (including unknown keys).
    #[error("config parse error: {0}")]
    Parse(String),
    /// Environment override carried an unparsable value.
    #[error("invalid value for {variable}: {detail}")]
    InvalidEnv {
        /// Variable name.
        variable: &'static str,
        /// Why the value was rejected.
        detail: String,
    },
    /// Semantic validation failure.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Workflow/worker scheduling section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkflowSection {
    /// Task queue the worker polls.
    pub task_queue: String,
    /// Overall workflow execution timeout.
    pub execution_timeout: HumanDuration,
    /// Per-run timeout before continue-as-new.
    pub run_timeout: HumanDuration,
    /// Single workflow-task timeout.
    pub task_timeout: HumanDuration,
    /// Maximum concurrent activities per worker.
    pub activity_max_concurrency: usize,
    /// Maximum concurrent workflow tasks per worker.
    pub workflow_max_concurrency: usize,
    /// Reminder cadence for human-wait states.
    pub reminder_interval: HumanDuration,
    /// Drain grace period on shutdown.
    pub shutdown_grace: HumanDuration,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            task_queue: "order-processing".to_string(),
            execution_timeout: HumanDuration::from_secs(24 * 3_600),
            run_timeout: HumanDuration::from_secs(12 * 3_600),
            task_timeout: HumanDuration::from_secs(60),
            activity_max_concurrency: 20,
            workflow_max_concurrency: 10,
            reminder_interval: HumanDuration::from_secs(4 * 3_600),
            shutdown_grace: HumanDuration::from_secs(30),
        }
    }
}

/// One declared committee provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    /// Provider identifier.
    pub id: String,
    /// Family tag for diversity selection.
    pub family: String,
    /// Calibrated weight; superseded by the weights file when present.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Per-call time budget in milliseconds.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
    /// HTTP endpoint serving the provider, when remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Returns the default provider weight.
const fn default_weight() -> f64 {
    1.0
}

/// Returns the default provider time budget.
const fn default_time_budget_ms() -> u64 {
    30_000
}

/// Committee section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CommitteeSection {
    /// Number of providers selected per round.
    pub n: usize,
    /// Minimum usable responses.
    pub min_usable: usize,
    /// Overall round time budget in milliseconds.
    pub timeout_ms: u64,
    /// Margin threshold: winner minus runner-up vote strength below which a
    /// field forces human review.
    pub consensus_threshold: f64,
    /// Overall confidence threshold.
    pub confidence_threshold: f64,
    /// Dissent strength above which consensus is split.
    pub dissent_min_strength: f64,
    /// Sample values per column in the evidence pack.
    pub sample_cap: usize,
    /// Path to the calibrated weights file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_path: Option<PathBuf>,
    /// Declared provider pool, in selection order.
    pub providers: Vec<ProviderEntry>,
}

impl Default for CommitteeSection {
    fn default() -> Self {
        Self {
            n: 3,
            min_usable: 2,
            timeout_ms: 30_000,
            consensus_threshold: 0.66,
            confidence_threshold: 0.75,
            dissent_min_strength: 0.2,
            sample_cap: 5,
            weights_path: None,
            providers: Vec::new(),
        }
    }
}

/// Matching section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MatcherSection {
    /// Fuzzy score threshold.
    pub fuzzy_threshold: f64,
    /// Ambiguity gap.
    pub ambiguity_gap: f64,
    /// Whether fuzzy item-name matching is enabled.
    pub fuzzy_item_names: bool,
    /// In-memory cache TTL in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for MatcherSection {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.75,
            ambiguity_gap: 0.10,
            fuzzy_item_names: true,
            cache_ttl_secs: 3_600,
        }
    }
}

/// Parser policy section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormulaPolicy {
    /// Block workbooks containing formulas.
    #[default]
    Strict,
    /// Accept computed values and flag the workbook.
    Lenient,
}

/// Parser section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ParserSection {
    /// Formula handling policy.
    pub formula_policy: FormulaPolicy,
    /// Arithmetic-mismatch tolerance in minor currency units.
    pub tolerance_minor: i64,
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            formula_policy: FormulaPolicy::default(),
            tolerance_minor: 1,
        }
    }
}

/// External catalog region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatalogRegion {
    /// European data center.
    #[default]
    Eu,
    /// Global (.com) data center.
    Com,
    /// India data center.
    In,
    /// Australia data center.
    Au,
    /// Japan data center.
    Jp,
}

impl CatalogRegion {
    /// Parses the documented region token.
    ///
    /// # Errors
    ///
    /// Returns the offending token when it is not a known region.
    pub fn parse(token: &str) -> Result<Self, String> {
        match token {
            "EU" => Ok(Self::Eu),
            "COM" => Ok(Self::Com),
            "IN" => Ok(Self::In),
            "AU" => Ok(Self::Au),
            "JP" => Ok(Self::Jp),
            other => Err(other.to_string()),
        }
    }
}

/// External catalog section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CatalogSection {
    /// Data-center region.
    pub region: CatalogRegion,
    /// Organisation identifier.
    pub org_id: String,
    /// Custom-field id carrying item GTINs.
    pub gtin_field_id: String,
    /// Custom-field id carrying the idempotency fingerprint.
    pub idempotency_field_id: String,
    /// Token-bucket request budget per tenant per minute.
    pub tenant_requests_per_minute: u32,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            region: CatalogRegion::Eu,
            org_id: String::new(),
            gtin_field_id: String::new(),
            idempotency_field_id: String::new(),
            tenant_requests_per_minute: 60,
        }
    }
}

/// Fingerprint section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct FingerprintSection {
    /// Date-bucket granularity.
    pub bucket_granularity: BucketGranularity,
}

/// Retention section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetentionSection {
    /// Audit-bundle retention in days.
    pub days_audit: u32,
    /// Original-file retention in days.
    pub days_original: u32,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            days_audit: MIN_RETENTION_DAYS,
            days_original: MIN_RETENTION_DAYS,
        }
    }
}

/// Evidence-store section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EvidenceSection {
    /// Root directory of the filesystem evidence store.
    pub root: PathBuf,
    /// Inline event payload limit in bytes; larger payloads spill.
    pub large_payload_bytes: usize,
}

impl Default for EvidenceSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./evidence"),
            large_payload_bytes: 64 * 1024,
        }
    }
}

/// Store (SQLite) section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreSection {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./orderflow.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Control-surface HTTP section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerSection {
    /// Bind address, e.g. `127.0.0.1:8088`.
    pub bind: String,
    /// Maximum in-flight requests.
    pub max_inflight: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8088".to_string(),
            max_inflight: 256,
        }
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Canonical Orderflow configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct OrderflowConfig {
    /// Workflow/worker scheduling.
    pub workflow: WorkflowSection,
    /// Committee behavior and provider pool.
    pub committee: CommitteeSection,
    /// Matching behavior.
    pub matcher: MatcherSection,
    /// Parser policy.
    pub parser: ParserSection,
    /// External catalog access.
    pub catalog: CatalogSection,
    /// Fingerprint bucketing.
    pub fingerprint: FingerprintSection,
    /// Retention periods.
    pub retention: RetentionSection,
    /// Evidence store.
    pub evidence: EvidenceSection,
    /// Durable store.
    pub store: StoreSection,
    /// Control surface.
    pub server: ServerSection,
}

impl OrderflowConfig {
    /// Loads configuration from the given path (or the default), applies
    /// environment overrides, and validates.
    ///
    /// A missing file at the *default* path yields the documented defaults;
    /// an explicitly requested path must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on unreadable files, parse failures, bad
    /// overrides, or semantic violations.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
        let (resolved, required) = match (path, env_path) {
            (Some(explicit), _) => (explicit.to_path_buf(), true),
            (None, Some(from_env)) => (from_env, true),
            (None, None) => (PathBuf::from(DEFAULT_CONFIG_NAME), false),
        };

        let mut config = if resolved.exists() {
            let metadata = fs::metadata(&resolved).map_err(|err| ConfigError::Unreadable {
                path: resolved.clone(),
                detail: err.to_string(),
            })?;
            if metadata.len() > MAX_CONFIG_FILE_SIZE {
                return Err(ConfigError::TooLarge(metadata.len()));
            }
            let text = fs::read_to_string(&resolved).map_err(|err| ConfigError::Unreadable {
                path: resolved.clone(),
                detail: err.to_string(),
            })?;
            toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?
        } else if required {
            return Err(ConfigError::Unreadable {
                path: resolved,
                detail: "file does not exist".to_string(),
            });
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the documented environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when a set variable fails to
    /// parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(&|name| env::var(name).ok())
    }

    /// Applies overrides from an arbitrary lookup (the env in production,
    /// a map in tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when a present value fails to
    /// parse.
    #[allow(
        clippy::too_many_lines,
        reason = "One linear block per documented variable keeps the override table auditable."
    )]
    pub fn apply_overrides_from(
        &mut self,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = present(lookup, "WORKFLOW_TASK_QUEUE") {
            self.workflow.task_queue = value;
        }
        if let Some(value) = present(lookup, "WORKFLOW_EXECUTION_TIMEOUT") {
            self.workflow.execution_timeout = parse_duration_env("WORKFLOW_EXECUTION_TIMEOUT", &value)?;
        }
        if let Some(value) = present(lookup, "WORKFLOW_RUN_TIMEOUT") {
            self.workflow.run_timeout = parse_duration_env("WORKFLOW_RUN_TIMEOUT", &value)?;
        }
        if let Some(value) = present(lookup, "WORKFLOW_TASK_TIMEOUT") {
            self.workflow.task_timeout = parse_duration_env("WORKFLOW_TASK_TIMEOUT", &value)?;
        }
        if let Some(value) = present(lookup, "ACTIVITY_MAX_CONCURRENCY") {
            self.workflow.activity_max_concurrency =
                parse_number_env("ACTIVITY_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = present(lookup, "WORKFLOW_MAX_CONCURRENCY") {
            self.workflow.workflow_max_concurrency =
                parse_number_env("WORKFLOW_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = present(lookup, "COMMITTEE_N") {
            self.committee.n = parse_number_env("COMMITTEE_N", &value)?;
        }
        if let Some(value) = present(lookup, "COMMITTEE_POOL") {
            let ordered: Vec<String> =
                value.split(',').map(|token| token.trim().to_string()).collect();
            self.committee.providers = reorder_pool(&self.committee.providers, &ordered)
                .map_err(|detail| ConfigError::InvalidEnv {
                    variable: "COMMITTEE_POOL",
                    detail,
                })?;
        }
        if let Some(value) = present(lookup, "COMMITTEE_TIMEOUT_MS") {
            self.committee.timeout_ms = parse_number_env("COMMITTEE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = present(lookup, "COMMITTEE_MIN_USABLE") {
            self.committee.min_usable = parse_number_env("COMMITTEE_MIN_USABLE", &value)?;
        }
        if let Some(value) = present(lookup, "COMMITTEE_CONSENSUS_THRESHOLD") {
            self.committee.consensus_threshold =
                parse_number_env("COMMITTEE_CONSENSUS_THRESHOLD", &value)?;
        }
        if let Some(value) = present(lookup, "COMMITTEE_CONFIDENCE_THRESHOLD") {
            self.committee.confidence_threshold =
                parse_number_env("COMMITTEE_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = present(lookup, "COMMITTEE_WEIGHTS_PATH") {
            self.committee.weights_path = Some(PathBuf::from(value));
        }
        if let Some(value) = present(lookup, "MATCHER_FUZZY_THRESHOLD") {
            self.matcher.fuzzy_threshold = parse_number_env("MATCHER_FUZZY_THRESHOLD", &value)?;
        }
        if let Some(value) = present(lookup, "MATCHER_AMBIGUITY_GAP") {
            self.matcher.ambiguity_gap = parse_number_env("MATCHER_AMBIGUITY_GAP", &value)?;
        }
        if let Some(value) = present(lookup, "PARSER_FORMULA_POLICY") {
            self.parser.formula_policy = match value.as_str() {
                "strict" => FormulaPolicy::Strict,
                "lenient" => FormulaPolicy::Lenient,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        variable: "PARSER_FORMULA_POLICY",
                        detail: format!("unknown policy {other}"),
                    });
                }
            };
        }
        if let Some(value) = present(lookup, "CATALOG_REGION") {
            self.catalog.region =
                CatalogRegion::parse(&value).map_err(|token| ConfigError::InvalidEnv {
                    variable: "CATALOG_REGION",
                    detail: format!("unknown region {token}"),
                })?;
        }
        if let Some(value) = present(lookup, "CATALOG_ORG_ID") {
            self.catalog.org_id = value;
        }
        if let Some(value) = present(lookup, "CATALOG_GTIN_FIELD_ID") {
            self.catalog.gtin_field_id = value;
        }
        if let Some(value) = present(lookup, "CATALOG_IDEMPOTENCY_FIELD_ID") {
            self.catalog.idempotency_field_id = value;
        }
        if let Some(value) = present(lookup, "FINGERPRINT_BUCKET_GRANULARITY") {
            self.fingerprint.bucket_granularity = match value.as_str() {
                "hour" => BucketGranularity::Hour,
                "day" => BucketGranularity::Day,
                "week" => BucketGranularity::Week,
                "month" => BucketGranularity::Month,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        variable: "FINGERPRINT_BUCKET_GRANULARITY",
                        detail: format!("unknown granularity {other}"),
                    });
                }
            };
        }
        if let Some(value) = present(lookup, "RETENTION_DAYS_AUDIT") {
            self.retention.days_audit = parse_number_env("RETENTION_DAYS_AUDIT", &value)?;
        }
        if let Some(value) = present(lookup, "RETENTION_DAYS_ORIGINAL") {
            self.retention.days_original = parse_number_env("RETENTION_DAYS_ORIGINAL", &value)?;
        }
        Ok(())
    }

    /// Validates the configuration against the documented limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.committee.providers.is_empty() {
            return Err(ConfigError::Invalid("committee.providers must not be empty".to_string()));
        }
        if self.committee.providers.len() > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "committee.providers exceeds the pool limit of {MAX_POOL_SIZE}"
            )));
        }
        if self.committee.n == 0 || self.committee.n > self.committee.providers.len() {
            return Err(ConfigError::Invalid(format!(
                "committee.n must be between 1 and the pool size ({})",
                self.committee.providers.len()
            )));
        }
        if self.committee.min_usable == 0 || self.committee.min_usable > self.committee.n {
            return Err(ConfigError::Invalid(
                "committee.min_usable must be between 1 and committee.n".to_string(),
            ));
        }
        let mut seen = BTreeMap::new();
        for provider in &self.committee.providers {
            if provider.id.trim().is_empty() {
                return Err(ConfigError::Invalid("provider id must not be empty".to_string()));
            }
            if seen.insert(provider.id.clone(), ()).is_some() {
                return Err(ConfigError::Invalid(format!("duplicate provider id {}", provider.id)));
            }
            if !(provider.weight.is_finite() && provider.weight > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "provider {} weight must be finite and positive",
                    provider.id
                )));
            }
        }
        for (name, value) in [
            ("committee.consensus_threshold", self.committee.consensus_threshold),
            ("committee.confidence_threshold", self.committee.confidence_threshold),
            ("matcher.fuzzy_threshold", self.matcher.fuzzy_threshold),
            ("matcher.ambiguity_gap", self.matcher.ambiguity_gap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be within 0..=1")));
            }
        }
        if self.workflow.activity_max_concurrency == 0
            || self.workflow.activity_max_concurrency > MAX_ACTIVITY_CONCURRENCY
        {
            return Err(ConfigError::Invalid(format!(
                "workflow.activity_max_concurrency must be between 1 and {MAX_ACTIVITY_CONCURRENCY}"
            )));
        }
        if self.workflow.workflow_max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "workflow.workflow_max_concurrency must be positive".to_string(),
            ));
        }
        if self.workflow.run_timeout.as_duration() > self.workflow.execution_timeout.as_duration() {
            return Err(ConfigError::Invalid(
                "workflow.run_timeout must not exceed workflow.execution_timeout".to_string(),
            ));
        }
        if self.retention.days_audit < MIN_RETENTION_DAYS
            || self.retention.days_original < MIN_RETENTION_DAYS
        {
            return Err(ConfigError::Invalid(format!(
                "retention must be at least {MIN_RETENTION_DAYS} days"
            )));
        }
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            )));
        }
        Ok(())
    }

    /// Derives the committee runtime configuration.
    #[must_use]
    pub const fn committee_config(&self) -> CommitteeConfig {
        CommitteeConfig {
            n: self.committee.n,
            min_usable: self.committee.min_usable,
            margin_threshold: self.committee.consensus_threshold,
            confidence_threshold: self.committee.confidence_threshold,
            dissent_min_strength: self.committee.dissent_min_strength,
            sample_cap: self.committee.sample_cap,
            timeout_ms: self.committee.timeout_ms,
        }
    }

    /// Derives the matcher runtime configuration.
    #[must_use]
    pub const fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            fuzzy_threshold: self.matcher.fuzzy_threshold,
            ambiguity_gap: self.matcher.ambiguity_gap,
            fuzzy_item_names: self.matcher.fuzzy_item_names,
            cache_ttl_secs: self.matcher.cache_ttl_secs,
        }
    }

    /// Derives the engine configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tolerance_minor: self.parser.tolerance_minor,
            bucket_granularity: self.fingerprint.bucket_granularity,
            large_payload_bytes: self.evidence.large_payload_bytes,
            ..EngineConfig::default()
        }
    }

    /// Derives the declared provider specs in pool order.
    #[must_use]
    pub fn provider_specs(&self) -> Vec<ProviderSpec> {
        self.committee
            .providers
            .iter()
            .map(|entry| ProviderSpec {
                id: ProviderId::new(entry.id.clone()),
                family: ProviderFamily::new(entry.family.clone()),
                weight: entry.weight,
                time_budget_ms: entry.time_budget_ms,
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Durations
// ============================================================================

/// Duration expressed as `<number><unit>` with unit `s`, `m`, or `h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HumanDuration(Duration);

impl HumanDuration {
    /// Creates a duration from whole seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// Returns the wrapped duration.
    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        self.0
    }
}

impl TryFrom<String> for HumanDuration {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let (number, multiplier) = match trimmed.chars().last() {
            Some('s') => (&trimmed[..trimmed.len() - 1], 1),
            Some('m') => (&trimmed[..trimmed.len() - 1], 60),
            Some('h') => (&trimmed[..trimmed.len() - 1], 3_600),
            _ => return Err(format!("expected <number><s|m|h>, got {trimmed}")),
        };
        let count: u64 =
            number.trim().parse().map_err(|_| format!("expected <number><s|m|h>, got {trimmed}"))?;
        Ok(Self(Duration::from_secs(count * multiplier)))
    }
}

impl From<HumanDuration> for String {
    fn from(value: HumanDuration) -> Self {
        let secs = value.0.as_secs();
        if secs % 3_600 == 0 && secs > 0 {
            format!("{}h", secs / 3_600)
        } else if secs % 60 == 0 && secs > 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{secs}s")
        }
    }
}

// ============================================================================
// SECTION: Env Helpers
// ============================================================================

/// Reads a non-empty value from the override lookup.
fn present(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

/// Parses a numeric environment value.
fn parse_number_env<T: std::str::FromStr>(
    variable: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        variable,
        detail: format!("not a valid number: {value}"),
    })
}

/// Parses a duration environment value.
fn parse_duration_env(variable: &'static str, value: &str) -> Result<HumanDuration, ConfigError> {
    HumanDuration::try_from(value.to_string()).map_err(|detail| ConfigError::InvalidEnv {
        variable,
        detail,
    })
}

/// Reorders the declared pool to match an ordered id list.
///
/// Every listed id must exist in the declared pool; unlisted providers are
/// dropped, which is how operators disable a provider without editing TOML.
fn reorder_pool(
    declared: &[ProviderEntry],
    ordered: &[String],
) -> Result<Vec<ProviderEntry>, String> {
    let mut result = Vec::with_capacity(ordered.len());
    for id in ordered {
        let entry = declared
            .iter()
            .find(|provider| &provider.id == id)
            .ok_or_else(|| format!("provider {id} is not declared in committee.providers"))?;
        result.push(entry.clone());
    }
    Ok(result)
}
