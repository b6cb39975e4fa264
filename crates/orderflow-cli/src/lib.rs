// crates/orderflow-cli/src/lib.rs
// ============================================================================
// Module: Orderflow CLI Library
// Description: Command definitions and implementations for the worker CLI.
// Purpose: Serve the control surface and run offline audit tooling.
// Dependencies: clap, orderflow-* crates, serde_json, tokio
// ============================================================================

//! ## Overview
//! The CLI wires the composition root: `serve` builds the stores, provider
//! pool, catalog client, and engine from configuration and runs the control
//! surface; `check-config` validates a configuration file and prints the
//! canonical example; `verify-bundle` re-hashes a sealed audit bundle
//! offline; `replay` reconstructs a case from its event stream and compares
//! it to the stored snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use orderflow_catalog::CatalogClientConfig;
use orderflow_catalog::HttpCatalogClient;
use orderflow_catalog::OAuthCredentials;
use orderflow_catalog::StaticSecretSource;
use orderflow_config::OrderflowConfig;
use orderflow_config::WeightsSnapshot;
use orderflow_config::config_toml_example;
use orderflow_config::load_weights;
use orderflow_core::CaseId;
use orderflow_core::CaseStore;
use orderflow_core::Committee;
use orderflow_core::EngineHandles;
use orderflow_core::EventLog;
use orderflow_core::Matcher;
use orderflow_core::PoolEntry;
use orderflow_core::WorkflowEngine;
use orderflow_core::replay_case;
use orderflow_core::runtime::verify_bundle;
use orderflow_evidence_fs::FsEvidenceStore;
use orderflow_providers::HttpProviderConfig;
use orderflow_providers::build_pool;
use orderflow_server::AppState;
use orderflow_server::NoopMetrics;
use orderflow_server::PassthroughParser;
use orderflow_server::ServerConfig;
use orderflow_server::WebhookNotifier;
use orderflow_server::run_server;
use orderflow_store_sqlite::SqliteStore;
use orderflow_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Orderflow worker and audit tooling.
#[derive(Debug, Parser)]
#[command(name = "orderflow", version, about = "Order-intake workflow worker")]
pub struct Cli {
    /// Path to orderflow.toml; defaults to the working directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the worker and control surface.
    Serve {
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
        /// Chat webhook receiving notifications.
        #[arg(long)]
        webhook: Option<String>,
    },
    /// Validate configuration and print the canonical example.
    CheckConfig {
        /// Print the annotated example instead of validating.
        #[arg(long)]
        example: bool,
    },
    /// Re-hash a sealed audit bundle offline.
    VerifyBundle {
        /// Case whose bundle to verify.
        case_id: String,
    },
    /// Replay a case from its event stream and diff against the snapshot.
    Replay {
        /// Case to replay.
        case_id: String,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures, rendered once at the top level.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),
    /// Composition failed (stores, providers, catalog).
    #[error("startup error: {0}")]
    Startup(String),
    /// Offline tooling failed.
    #[error("{0}")]
    Tooling(String),
    /// Verification or replay found divergences.
    #[error("verification failed:\n{0}")]
    VerificationFailed(String),
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Runs the parsed CLI, writing human output to the given sink.
///
/// # Errors
///
/// Returns [`CliError`] for every failure; the binary maps it to a non-zero
/// exit code.
pub fn run(cli: Cli, out: &mut dyn Write) -> Result<(), CliError> {
    match cli.command {
        Command::Serve {
            bind,
            webhook,
        } => serve(cli.config.as_deref(), bind, webhook),
        Command::CheckConfig {
            example,
        } => {
            if example {
                writeln!(out, "{}", config_toml_example())
                    .map_err(|err| CliError::Tooling(err.to_string()))?;
                return Ok(());
            }
            let config = OrderflowConfig::load(cli.config.as_deref())
                .map_err(|err| CliError::Config(err.to_string()))?;
            writeln!(
                out,
                "configuration is valid: {} providers, queue {}",
                config.committee.providers.len(),
                config.workflow.task_queue
            )
            .map_err(|err| CliError::Tooling(err.to_string()))?;
            Ok(())
        }
        Command::VerifyBundle {
            case_id,
        } => {
            let config = OrderflowConfig::load(cli.config.as_deref())
                .map_err(|err| CliError::Config(err.to_string()))?;
            let evidence = FsEvidenceStore::new(&config.evidence.root)
                .map_err(|err| CliError::Startup(err.to_string()))?;
            let report = verify_bundle(&evidence, &CaseId::new(case_id))
                .map_err(|err| CliError::Tooling(err.to_string()))?;
            if report.passed() {
                writeln!(out, "bundle verified: {} artifacts checked", report.checked)
                    .map_err(|err| CliError::Tooling(err.to_string()))?;
                Ok(())
            } else {
                Err(CliError::VerificationFailed(report.failures.join("\n")))
            }
        }
        Command::Replay {
            case_id,
        } => {
            let config = OrderflowConfig::load(cli.config.as_deref())
                .map_err(|err| CliError::Config(err.to_string()))?;
            let store = SqliteStore::open(&SqliteStoreConfig::new(&config.store.path))
                .map_err(|err| CliError::Startup(err.to_string()))?;
            let case_id = CaseId::new(case_id);
            let events = store
                .read_by_case(&case_id, 1)
                .map_err(|err| CliError::Tooling(err.to_string()))?;
            let replayed =
                replay_case(&events).map_err(|err| CliError::Tooling(err.to_string()))?;
            let snapshot = store
                .load(&case_id)
                .map_err(|err| CliError::Tooling(err.to_string()))?
                .ok_or_else(|| CliError::Tooling(format!("unknown case {case_id}")))?;
            let diffs = replayed.diff_against(&snapshot);
            if diffs.is_empty() {
                writeln!(out, "replay consistent: {} events", events.len())
                    .map_err(|err| CliError::Tooling(err.to_string()))?;
                Ok(())
            } else {
                Err(CliError::VerificationFailed(diffs.join("\n")))
            }
        }
    }
}

// ============================================================================
// SECTION: Serve Composition
// ============================================================================

/// Builds the composition root and runs the worker.
fn serve(
    config_path: Option<&std::path::Path>,
    bind_override: Option<String>,
    webhook: Option<String>,
) -> Result<(), CliError> {
    let config =
        OrderflowConfig::load(config_path).map_err(|err| CliError::Config(err.to_string()))?;

    let evidence = Arc::new(
        FsEvidenceStore::new(&config.evidence.root)
            .map_err(|err| CliError::Startup(err.to_string()))?,
    );
    let store = Arc::new(
        SqliteStore::open(&SqliteStoreConfig::new(&config.store.path))
            .map_err(|err| CliError::Startup(err.to_string()))?,
    );

    let weights = match &config.committee.weights_path {
        Some(path) => load_weights(path).map_err(|err| CliError::Startup(err.to_string()))?,
        None => WeightsSnapshot::default(),
    };
    let pool = build_committee_pool(&config, &weights)?;
    let committee = Committee::new(pool, config.committee_config());

    let catalog = Arc::new(build_catalog(&config)?);
    let matcher = Matcher::new(
        Arc::clone(&catalog) as Arc<dyn orderflow_core::CatalogClient>,
        Arc::clone(&store) as Arc<dyn orderflow_core::MatchCache>,
        config.matcher_config(),
    );

    let notifier = Arc::new(
        WebhookNotifier::new(webhook).map_err(|err| CliError::Startup(err.to_string()))?,
    );
    let handles = EngineHandles {
        parser: Arc::new(PassthroughParser),
        evidence: Arc::clone(&evidence) as Arc<dyn orderflow_core::EvidenceStore>,
        events: Arc::clone(&store) as Arc<dyn orderflow_core::EventLog>,
        cases: Arc::clone(&store) as Arc<dyn orderflow_core::CaseStore>,
        fingerprints: Arc::clone(&store) as Arc<dyn orderflow_core::FingerprintStore>,
        catalog,
        notifier,
        clock: Arc::new(SystemClock),
        sleeper: Arc::new(ThreadSleeper),
    };
    let engine =
        Arc::new(WorkflowEngine::new(handles, committee, matcher, config.engine_config()));
    let state = Arc::new(AppState::new(
        engine,
        config.workflow.activity_max_concurrency,
        config.workflow.workflow_max_concurrency,
        Arc::new(NoopMetrics),
    ));

    let server_config = ServerConfig {
        bind: bind_override.unwrap_or_else(|| config.server.bind.clone()),
        reminder_interval: config.workflow.reminder_interval.as_duration(),
        shutdown_grace: config.workflow.shutdown_grace.as_duration(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Startup(err.to_string()))?;
    runtime
        .block_on(run_server(server_config, state))
        .map_err(|err| CliError::Startup(err.to_string()))
}

/// Assembles the committee pool from configuration and weights.
fn build_committee_pool(
    config: &OrderflowConfig,
    weights: &WeightsSnapshot,
) -> Result<Vec<PoolEntry>, CliError> {
    build_pool(&config.committee.providers, weights, &HttpProviderConfig::default())
        .map_err(|err| CliError::Startup(err.to_string()))
}

/// Builds the catalog client with credentials from the environment.
fn build_catalog(config: &OrderflowConfig) -> Result<HttpCatalogClient, CliError> {
    let credentials = OAuthCredentials {
        client_id: std::env::var("ORDERFLOW_CATALOG_CLIENT_ID").unwrap_or_default(),
        client_secret: std::env::var("ORDERFLOW_CATALOG_CLIENT_SECRET").unwrap_or_default(),
        refresh_token: std::env::var("ORDERFLOW_CATALOG_REFRESH_TOKEN").unwrap_or_default(),
    };
    let client_config = CatalogClientConfig::for_region(
        config.catalog.region,
        config.catalog.org_id.clone(),
        config.catalog.gtin_field_id.clone(),
        config.catalog.idempotency_field_id.clone(),
    );
    HttpCatalogClient::new(
        client_config,
        Box::new(StaticSecretSource::new(credentials)),
        config.catalog.tenant_requests_per_minute,
    )
    .map_err(|err| CliError::Startup(err.to_string()))
}

// ============================================================================
// SECTION: Production Clock & Sleeper
// ============================================================================

/// Wall clock for the activity layer.
struct SystemClock;

impl orderflow_core::interfaces::Clock for SystemClock {
    fn now(&self) -> orderflow_core::Timestamp {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        orderflow_core::Timestamp::UnixMillis(millis)
    }
}

/// Thread-blocking sleeper for retry backoff.
struct ThreadSleeper;

impl orderflow_core::Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
