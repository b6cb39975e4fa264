// crates/orderflow-server/tests/http_api.rs
// ============================================================================
// Module: Control Surface HTTP Tests
// Description: End-to-end workflow driving over the documented routes.
// Purpose: Validate statuses, signals, conflicts, and probes over the wire.
// Dependencies: orderflow-server, orderflow-providers, reqwest
// ============================================================================
//! ## Overview
//! Boots the control surface on an ephemeral port over in-memory stores,
//! drives a case from start through approval to completion, and checks the
//! documented conflict and not-found behaviors.

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
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use orderflow_core::CanonicalOrder;
use orderflow_core::CatalogClient;
use orderflow_core::ColumnCandidate;
use orderflow_core::ColumnStats;
use orderflow_core::Committee;
use orderflow_core::CommitteeConfig;
use orderflow_core::CustomerBlock;
use orderflow_core::CustomerCandidate;
use orderflow_core::CustomerId;
use orderflow_core::DraftId;
use orderflow_core::DraftPayload;
use orderflow_core::DraftReceipt;
use orderflow_core::DraftRecord;
use orderflow_core::EngineConfig;
use orderflow_core::EngineError;
use orderflow_core::EngineHandles;
use orderflow_core::EvidenceStore;
use orderflow_core::InMemoryCaseStore;
use orderflow_core::InMemoryEventLog;
use orderflow_core::InMemoryEvidenceStore;
use orderflow_core::InMemoryFingerprintStore;
use orderflow_core::InMemoryMatchCache;
use orderflow_core::ItemCandidate;
use orderflow_core::ItemId;
use orderflow_core::ItemQuery;
use orderflow_core::LineEvidence;
use orderflow_core::LineItem;
use orderflow_core::Matcher;
use orderflow_core::MatcherConfig;
use orderflow_core::Money;
use orderflow_core::Notification;
use orderflow_core::Notifier;
use orderflow_core::NotifyError;
use orderflow_core::OrderMeta;
use orderflow_core::ParseOutcome;
use orderflow_core::PoolEntry;
use orderflow_core::ProviderFamily;
use orderflow_core::ProviderId;
use orderflow_core::ProviderSpec;
use orderflow_core::RetryPolicy;
use orderflow_core::Sha256Digest;
use orderflow_core::Sleeper;
use orderflow_core::TenantId;
use orderflow_core::Timestamp;
use orderflow_core::WorkflowEngine;
use orderflow_core::interfaces::Clock;
use orderflow_providers::FixtureProvider;
use orderflow_server::AppState;
use orderflow_server::NoopMetrics;
use orderflow_server::PassthroughParser;
use orderflow_server::build_router;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Logical clock.
#[derive(Debug, Default)]
struct LogicalClock {
    /// Next tick.
    ticks: AtomicU64,
}

impl Clock for LogicalClock {
    fn now(&self) -> Timestamp {
        Timestamp::Logical(self.ticks.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Instant sleeper.
#[derive(Debug, Default)]
struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) {}
}

/// Silent notifier.
#[derive(Debug, Default)]
struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// One-customer one-item catalog.
#[derive(Default)]
struct TestCatalog {
    /// Drafts by idempotency token.
    drafts: Mutex<BTreeMap<String, DraftReceipt>>,
}

impl CatalogClient for TestCatalog {
    fn search_customer(
        &self,
        name: &str,
        _tenant: &TenantId,
    ) -> Result<Vec<CustomerCandidate>, EngineError> {
        if name.to_lowercase().contains("acme") {
            Ok(vec![CustomerCandidate {
                id: CustomerId::new("cust-1"),
                display_name: "ACME Ltd".to_string(),
            }])
        } else {
            Ok(Vec::new())
        }
    }

    fn get_customer(&self, id: &CustomerId) -> Result<CustomerCandidate, EngineError> {
        Ok(CustomerCandidate {
            id: id.clone(),
            display_name: "ACME Ltd".to_string(),
        })
    }

    fn search_item(
        &self,
        query: &ItemQuery,
        _tenant: &TenantId,
    ) -> Result<Vec<ItemCandidate>, EngineError> {
        let matches = match query {
            ItemQuery::Sku(sku) => sku.eq_ignore_ascii_case("SKU-001"),
            ItemQuery::Gtin(_) | ItemQuery::Name(_) => false,
        };
        if matches {
            Ok(vec![ItemCandidate {
                id: ItemId::new("item-1"),
                sku: "SKU-001".to_string(),
                gtin: None,
                name: "Widget".to_string(),
                unit_price: Money::from_minor(4_200),
            }])
        } else {
            Ok(Vec::new())
        }
    }

    fn create_draft(
        &self,
        _payload: &DraftPayload,
        idempotency_token: &Sha256Digest,
    ) -> Result<DraftReceipt, EngineError> {
        let mut drafts = self.drafts.lock().unwrap();
        if let Some(existing) = drafts.get(idempotency_token.as_str()) {
            let mut receipt = existing.clone();
            receipt.is_duplicate = true;
            return Ok(receipt);
        }
        let receipt = DraftReceipt {
            draft_id: DraftId::new(format!("draft-{}", drafts.len() + 1)),
            draft_number: format!("SO-{:04}", drafts.len() + 1),
            is_duplicate: false,
        };
        drafts.insert(idempotency_token.as_str().to_string(), receipt.clone());
        Ok(receipt)
    }

    fn find_draft_by_idempotency_token(
        &self,
        token: &Sha256Digest,
    ) -> Result<Option<DraftRecord>, EngineError> {
        Ok(self.drafts.lock().unwrap().get(token.as_str()).map(|receipt| DraftRecord {
            draft_id: receipt.draft_id.clone(),
            draft_number: receipt.draft_number.clone(),
        }))
    }
}

/// Committee response body mapping every field to `c1`.
fn unanimous_body() -> String {
    let fields = ["customer", "description", "quantity", "unit_price", "sku", "gtin"];
    let mappings: Vec<serde_json::Value> = fields
        .iter()
        .map(|field| {
            serde_json::json!({
                "field": field,
                "selectedColumnId": "c1",
                "confidence": 0.95,
                "reasoning": "header match",
            })
        })
        .collect();
    serde_json::json!({ "mappings": mappings, "issues": [], "overallConfidence": 0.95 })
        .to_string()
}

/// Builds the fixture pool of three one-family providers.
fn pool() -> Vec<PoolEntry> {
    ["alpha", "beta", "gamma"]
        .iter()
        .map(|family| PoolEntry {
            spec: ProviderSpec {
                id: ProviderId::new(format!("{family}-1")),
                family: ProviderFamily::new(*family),
                weight: 1.0,
                time_budget_ms: 1_000,
            },
            provider: Arc::new(FixtureProvider::new(
                ProviderId::new(format!("{family}-1")),
                ProviderFamily::new(*family),
                unanimous_body(),
            )),
        })
        .collect()
}

/// Serializes an upload fixture for the passthrough parser.
fn upload_fixture() -> Vec<u8> {
    let order = CanonicalOrder {
        version: 1,
        meta: OrderMeta {
            source_filename: "order.xlsx".to_string(),
            file_sha256: Sha256Digest::of_bytes(b"placeholder"),
            language: Some("en".to_string()),
            parser_version: "test-1".to_string(),
            had_formulas: false,
        },
        customer: CustomerBlock {
            name: "ACME Ltd".to_string(),
            evidence: None,
        },
        lines: vec![LineItem {
            line_number: 1,
            description: Some("Widget".to_string()),
            quantity: 2.0,
            unit_price: Some(Money::from_minor(9_900)),
            line_total: Some(Money::from_minor(19_800)),
            sku: Some("SKU-001".to_string()),
            gtin: None,
            evidence: LineEvidence::default(),
        }],
        totals: None,
        issues: Vec::new(),
    };
    let columns = vec![ColumnCandidate {
        column_id: "c1".into(),
        header: Some("col".to_string()),
        samples: vec!["Widget".to_string()],
        stats: ColumnStats::default(),
    }];
    serde_json::to_vec(&ParseOutcome::Parsed {
        order,
        columns,
        language: Some("en".to_string()),
    })
    .unwrap()
}

// ============================================================================
// SECTION: Server Boot
// ============================================================================

/// Boots the control surface on an ephemeral port; returns its base URL.
fn boot() -> (String, Arc<InMemoryEvidenceStore>) {
    let evidence = Arc::new(InMemoryEvidenceStore::new());
    let catalog = Arc::new(TestCatalog::default());
    let handles = EngineHandles {
        parser: Arc::new(PassthroughParser),
        evidence: Arc::clone(&evidence) as Arc<dyn EvidenceStore>,
        events: Arc::new(InMemoryEventLog::new()),
        cases: Arc::new(InMemoryCaseStore::new()),
        fingerprints: Arc::new(InMemoryFingerprintStore::new()),
        catalog: Arc::clone(&catalog) as Arc<dyn CatalogClient>,
        notifier: Arc::new(SilentNotifier),
        clock: Arc::new(LogicalClock::default()),
        sleeper: Arc::new(InstantSleeper),
    };
    let committee = Committee::new(pool(), CommitteeConfig::default());
    let matcher = Matcher::new(
        catalog,
        Arc::new(InMemoryMatchCache::new()),
        MatcherConfig::default(),
    );
    let config = EngineConfig {
        retry_standard: RetryPolicy {
            max_attempts: 2,
            initial: Duration::from_millis(1),
            coefficient: 2,
            cap: Duration::from_millis(2),
        },
        ..EngineConfig::default()
    };
    let engine = Arc::new(WorkflowEngine::new(handles, committee, matcher, config));
    let state = Arc::new(AppState::new(engine, 8, 4, Arc::new(NoopMetrics)));

    let (addr_tx, addr_rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            addr_tx.send(addr).unwrap();
            axum::serve(listener, build_router(state)).await.unwrap();
        });
    });
    let addr = addr_rx.recv().unwrap();
    (format!("http://{addr}"), evidence)
}

/// Polls a workflow's status until it reaches `expected` or times out.
fn wait_for_status(client: &reqwest::blocking::Client, base: &str, id: &str, expected: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let response = client.get(format!("{base}/workflow/{id}/status")).send().unwrap();
        if response.status().is_success() {
            let body: serde_json::Value = response.json().unwrap();
            if body.get("status").and_then(serde_json::Value::as_str) == Some(expected) {
                return;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for status {expected}");
        thread::sleep(Duration::from_millis(25));
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies the full start-approve-complete flow over HTTP.
#[test]
fn workflow_completes_over_http() {
    let (base, evidence) = boot();
    let client = reqwest::blocking::Client::new();
    evidence.put("uploads/W1.xlsx", &upload_fixture()).unwrap();

    let response = client
        .post(format!("{base}/workflow/start"))
        .json(&serde_json::json!({
            "case_id": "W1",
            "blob_uri": "uploads/W1.xlsx",
            "tenant_id": "t-1",
            "user_id": "u-1",
            "chat_context": "thread-1",
        }))
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body.get("workflow_id").unwrap(), "W1");
    assert_eq!(body.get("status_url").unwrap(), "/workflow/W1/status");

    wait_for_status(&client, &base, "W1", "awaiting_approval");

    // Duplicate start conflicts.
    let duplicate = client
        .post(format!("{base}/workflow/start"))
        .json(&serde_json::json!({
            "case_id": "W1",
            "blob_uri": "uploads/W1.xlsx",
            "tenant_id": "t-1",
            "user_id": "u-1",
            "chat_context": "thread-1",
        }))
        .send()
        .unwrap();
    assert_eq!(duplicate.status().as_u16(), 409);

    // Out-of-state signal conflicts but is recorded.
    let wrong = client
        .post(format!("{base}/workflow/W1/signal/file_reuploaded"))
        .json(&serde_json::json!({ "new_blob_uri": "uploads/other.xlsx" }))
        .send()
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 409);

    // Approval drives the case to completion.
    let approve = client
        .post(format!("{base}/workflow/W1/signal/approval_received"))
        .json(&serde_json::json!({ "approved": true, "by": "approver-1" }))
        .send()
        .unwrap();
    assert_eq!(approve.status().as_u16(), 202);
    wait_for_status(&client, &base, "W1", "completed");

    let state = client
        .get(format!("{base}/workflow/W1/query/state"))
        .send()
        .unwrap();
    assert_eq!(state.status().as_u16(), 200);
    let body: serde_json::Value = state.json().unwrap();
    assert!(body.get("result").and_then(|r| r.get("draft_id")).is_some());
}

/// Verifies unknown workflows answer 404 and probes answer 200.
#[test]
fn unknown_workflow_and_probes() {
    let (base, _) = boot();
    let client = reqwest::blocking::Client::new();

    let missing = client.get(format!("{base}/workflow/nope/status")).send().unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    let unknown_query =
        client.get(format!("{base}/workflow/nope/query/other")).send().unwrap();
    assert_eq!(unknown_query.status().as_u16(), 404);

    for probe in ["health", "live", "ready"] {
        let response = client.get(format!("{base}/{probe}")).send().unwrap();
        assert_eq!(response.status().as_u16(), 200, "probe {probe}");
    }
}

/// Verifies a malformed signal payload answers 400.
#[test]
fn malformed_signal_is_rejected() {
    let (base, evidence) = boot();
    let client = reqwest::blocking::Client::new();
    evidence.put("uploads/W2.xlsx", &upload_fixture()).unwrap();
    client
        .post(format!("{base}/workflow/start"))
        .json(&serde_json::json!({
            "case_id": "W2",
            "blob_uri": "uploads/W2.xlsx",
            "tenant_id": "t-1",
            "user_id": "u-1",
            "chat_context": "thread-1",
        }))
        .send()
        .unwrap();

    let bad = client
        .post(format!("{base}/workflow/W2/signal/approval_received"))
        .json(&serde_json::json!({ "approved": "yes-please" }))
        .send()
        .unwrap();
    assert_eq!(bad.status().as_u16(), 400);
}

/// Verifies graceful cancel terminates the case with a sealed outcome.
#[test]
fn cancel_terminates_case() {
    let (base, evidence) = boot();
    let client = reqwest::blocking::Client::new();
    evidence.put("uploads/W3.xlsx", &upload_fixture()).unwrap();
    client
        .post(format!("{base}/workflow/start"))
        .json(&serde_json::json!({
            "case_id": "W3",
            "blob_uri": "uploads/W3.xlsx",
            "tenant_id": "t-1",
            "user_id": "u-1",
            "chat_context": "thread-1",
        }))
        .send()
        .unwrap();
    wait_for_status(&client, &base, "W3", "awaiting_approval");

    let cancelled = client
        .post(format!("{base}/workflow/W3/cancel"))
        .json(&serde_json::json!({ "reason": "operator request" }))
        .send()
        .unwrap();
    assert_eq!(cancelled.status().as_u16(), 200);
    wait_for_status(&client, &base, "W3", "cancelled");
}
