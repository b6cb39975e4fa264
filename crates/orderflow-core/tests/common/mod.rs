// crates/orderflow-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Fixtures
// Description: Mock collaborators and engine assembly for pipeline tests.
// Purpose: Exercise the engine over in-memory stores without external I/O.
// Dependencies: orderflow-core
// ============================================================================
//! ## Overview
//! The mocks implement the collaborator interfaces deterministically: a
//! parser that decodes fixture uploads, prompt-aware committee providers, a
//! scriptable catalog, a logical clock, and a recording notifier.

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
    dead_code,
    reason = "Test-only fixtures; not every test uses every helper."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use orderflow_core::CanonicalOrder;
use orderflow_core::CaseId;
use orderflow_core::ChatThreadId;
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
use orderflow_core::CaseStore;
use orderflow_core::EngineConfig;
use orderflow_core::EngineError;
use orderflow_core::EngineHandles;
use orderflow_core::EventLog;
use orderflow_core::EvidenceStore;
use orderflow_core::ErrorCode;
use orderflow_core::FingerprintStore;
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
use orderflow_core::ModelProvider;
use orderflow_core::Money;
use orderflow_core::Notification;
use orderflow_core::Notifier;
use orderflow_core::NotifyError;
use orderflow_core::OrderMeta;
use orderflow_core::OrderParser;
use orderflow_core::ParseOutcome;
use orderflow_core::ParserError;
use orderflow_core::PoolEntry;
use orderflow_core::ProviderError;
use orderflow_core::ProviderFamily;
use orderflow_core::ProviderId;
use orderflow_core::ProviderSpec;
use orderflow_core::RetryPolicy;
use orderflow_core::Sha256Digest;
use orderflow_core::Sleeper;
use orderflow_core::StartRequest;
use orderflow_core::TenantId;
use orderflow_core::Timestamp;
use orderflow_core::UserId;
use orderflow_core::WorkflowEngine;
use orderflow_core::interfaces::CatalogClient;
use orderflow_core::interfaces::Clock;

// ============================================================================
// SECTION: Clock & Sleeper
// ============================================================================

/// Monotonic logical clock.
#[derive(Debug, Default)]
pub struct LogicalClock {
    /// Next tick value.
    ticks: AtomicU64,
}

impl Clock for LogicalClock {
    fn now(&self) -> Timestamp {
        Timestamp::Logical(self.ticks.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Sleeper that never sleeps, keeping retry tests instant.
#[derive(Debug, Default)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) {}
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Parser decoding uploads that are JSON-encoded [`ParseOutcome`] fixtures.
#[derive(Debug, Default)]
pub struct FixtureParser;

impl OrderParser for FixtureParser {
    fn parse(&self, _filename: &str, bytes: &[u8]) -> Result<ParseOutcome, ParserError> {
        serde_json::from_slice(bytes)
            .map_err(|err| ParserError::Unavailable(format!("bad fixture: {err}")))
    }
}

// ============================================================================
// SECTION: Providers
// ============================================================================

/// Prompt-aware committee provider driven by a closure.
pub struct ScriptedProvider {
    /// Provider id.
    pub id: ProviderId,
    /// Provider family.
    pub family: ProviderFamily,
    /// Response builder over the received prompt.
    pub respond: Box<dyn Fn(&str) -> String + Send + Sync>,
}

impl ModelProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    fn family(&self) -> ProviderFamily {
        self.family.clone()
    }

    fn invoke(&self, prompt: &str, _time_budget_ms: u64) -> Result<String, ProviderError> {
        Ok((self.respond)(prompt))
    }
}

/// Builds a committee response mapping every expected field to `column`.
pub fn uniform_response(column: &str, confidence: f64) -> String {
    let fields = ["customer", "description", "quantity", "unit_price", "sku", "gtin"];
    let mappings: Vec<serde_json::Value> = fields
        .iter()
        .map(|field| {
            serde_json::json!({
                "field": field,
                "selectedColumnId": column,
                "confidence": confidence,
                "reasoning": "header match",
            })
        })
        .collect();
    serde_json::json!({
        "mappings": mappings,
        "issues": [],
        "overallConfidence": confidence,
    })
    .to_string()
}

/// Builds a response mapping every field to `base` except `field -> column`.
pub fn response_with_override(base: &str, field: &str, column: &str, confidence: f64) -> String {
    let fields = ["customer", "description", "quantity", "unit_price", "sku", "gtin"];
    let mappings: Vec<serde_json::Value> = fields
        .iter()
        .map(|name| {
            let chosen = if *name == field { column } else { base };
            serde_json::json!({
                "field": name,
                "selectedColumnId": chosen,
                "confidence": confidence,
                "reasoning": "header match",
            })
        })
        .collect();
    serde_json::json!({
        "mappings": mappings,
        "issues": [],
        "overallConfidence": confidence,
    })
    .to_string()
}

/// Three one-family-each providers that agree on column `c1`.
pub fn unanimous_pool() -> Vec<PoolEntry> {
    ["alpha", "beta", "gamma"]
        .iter()
        .map(|name| PoolEntry {
            spec: ProviderSpec {
                id: ProviderId::new(format!("{name}-1")),
                family: ProviderFamily::new(*name),
                weight: 1.0,
                time_budget_ms: 1_000,
            },
            provider: Arc::new(ScriptedProvider {
                id: ProviderId::new(format!("{name}-1")),
                family: ProviderFamily::new(*name),
                respond: Box::new(|_prompt| uniform_response("c1", 0.95)),
            }),
        })
        .collect()
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Scriptable catalog with transient-failure injection.
#[derive(Default)]
pub struct MockCatalog {
    /// Known customers.
    pub customers: Vec<CustomerCandidate>,
    /// Known items.
    pub items: Vec<ItemCandidate>,
    /// Mutable call state.
    pub state: Mutex<CatalogState>,
    /// Number of leading `create_draft` calls to fail with 503.
    pub fail_creates: u64,
}

/// Mutable catalog call state.
#[derive(Debug, Default)]
pub struct CatalogState {
    /// Drafts created, keyed by idempotency token.
    pub drafts: BTreeMap<String, DraftReceipt>,
    /// Total `create_draft` invocations.
    pub create_calls: u64,
}

impl MockCatalog {
    /// Creates a catalog with the given customers and items.
    pub fn with_data(customers: Vec<CustomerCandidate>, items: Vec<ItemCandidate>) -> Self {
        Self {
            customers,
            items,
            state: Mutex::new(CatalogState::default()),
            fail_creates: 0,
        }
    }
}

impl CatalogClient for MockCatalog {
    fn search_customer(
        &self,
        name: &str,
        _tenant: &TenantId,
    ) -> Result<Vec<CustomerCandidate>, EngineError> {
        let needle = name.to_lowercase();
        Ok(self
            .customers
            .iter()
            .filter(|candidate| candidate.display_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    fn get_customer(&self, id: &CustomerId) -> Result<CustomerCandidate, EngineError> {
        self.customers
            .iter()
            .find(|candidate| &candidate.id == id)
            .cloned()
            .ok_or_else(|| EngineError::new(ErrorCode::InvalidRequest, "unknown customer"))
    }

    fn search_item(
        &self,
        query: &ItemQuery,
        _tenant: &TenantId,
    ) -> Result<Vec<ItemCandidate>, EngineError> {
        Ok(match query {
            ItemQuery::Sku(sku) => {
                let needle = sku.to_lowercase();
                self.items
                    .iter()
                    .filter(|item| item.sku.to_lowercase() == needle)
                    .cloned()
                    .collect()
            }
            ItemQuery::Gtin(gtin) => self
                .items
                .iter()
                .filter(|item| item.gtin.as_deref() == Some(gtin.as_str()))
                .cloned()
                .collect(),
            ItemQuery::Name(_) => self.items.clone(),
        })
    }

    fn create_draft(
        &self,
        _payload: &DraftPayload,
        idempotency_token: &Sha256Digest,
    ) -> Result<DraftReceipt, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if state.create_calls <= self.fail_creates {
            return Err(EngineError::new(
                ErrorCode::CatalogUnavailable,
                "503 service unavailable",
            ));
        }
        if let Some(existing) = state.drafts.get(idempotency_token.as_str()) {
            return Ok(DraftReceipt {
                draft_id: existing.draft_id.clone(),
                draft_number: existing.draft_number.clone(),
                is_duplicate: true,
            });
        }
        let receipt = DraftReceipt {
            draft_id: DraftId::new(format!("draft-{}", state.drafts.len() + 1)),
            draft_number: format!("SO-{:04}", state.drafts.len() + 1),
            is_duplicate: false,
        };
        state.drafts.insert(idempotency_token.as_str().to_string(), receipt.clone());
        Ok(receipt)
    }

    fn find_draft_by_idempotency_token(
        &self,
        token: &Sha256Digest,
    ) -> Result<Option<DraftRecord>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(state.drafts.get(token.as_str()).map(|receipt| DraftRecord {
            draft_id: receipt.draft_id.clone(),
            draft_number: receipt.draft_number.clone(),
        }))
    }
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notifier recording every delivered notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    /// Delivered notifications in order.
    pub sent: Mutex<Vec<Notification>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Order Fixtures
// ============================================================================

/// Builds a single-line order fixture for `customer` / `sku`.
pub fn order_fixture(customer: &str, sku: &str, unit_price_minor: i64) -> CanonicalOrder {
    CanonicalOrder {
        version: 1,
        meta: OrderMeta {
            source_filename: "order.xlsx".to_string(),
            file_sha256: Sha256Digest::of_bytes(b"placeholder"),
            language: Some("en".to_string()),
            parser_version: "test-1".to_string(),
            had_formulas: false,
        },
        customer: CustomerBlock {
            name: customer.to_string(),
            evidence: None,
        },
        lines: vec![LineItem {
            line_number: 1,
            description: Some("Widget".to_string()),
            quantity: 2.0,
            unit_price: Some(Money::from_minor(unit_price_minor)),
            line_total: Some(Money::from_minor(unit_price_minor * 2)),
            sku: Some(sku.to_string()),
            gtin: None,
            evidence: LineEvidence::default(),
        }],
        totals: None,
        issues: Vec::new(),
    }
}

/// Default candidate columns for fixtures.
pub fn fixture_columns() -> Vec<ColumnCandidate> {
    ["c1", "c2"]
        .iter()
        .map(|id| ColumnCandidate {
            column_id: id.to_string().into(),
            header: Some(format!("col {id}")),
            samples: vec!["Widget".to_string(), "2".to_string()],
            stats: ColumnStats {
                non_empty: 2,
                numeric: 1,
                distinct: 2,
            },
        })
        .collect()
}

/// Serializes a parsed-outcome fixture as upload bytes.
pub fn upload_bytes(order: &CanonicalOrder) -> Vec<u8> {
    serde_json::to_vec(&ParseOutcome::Parsed {
        order: order.clone(),
        columns: fixture_columns(),
        language: Some("en".to_string()),
    })
    .unwrap()
}

/// Serializes a blocked-outcome fixture as upload bytes.
pub fn blocked_bytes() -> Vec<u8> {
    serde_json::to_vec(&ParseOutcome::Blocked {
        reason: orderflow_core::BlockedReason::Formulas,
    })
    .unwrap()
}

// ============================================================================
// SECTION: Engine Assembly
// ============================================================================

/// Engine plus every in-memory store it runs over.
pub struct Harness {
    /// The engine under test.
    pub engine: WorkflowEngine,
    /// Evidence store.
    pub evidence: Arc<InMemoryEvidenceStore>,
    /// Event log.
    pub events: Arc<InMemoryEventLog>,
    /// Case store.
    pub cases: Arc<InMemoryCaseStore>,
    /// Fingerprint registry.
    pub fingerprints: Arc<InMemoryFingerprintStore>,
    /// Recorded notifications.
    pub notifier: Arc<RecordingNotifier>,
    /// Catalog mock.
    pub catalog: Arc<MockCatalog>,
}

/// Assembles an engine over in-memory stores.
pub fn harness(catalog: MockCatalog, pool: Vec<PoolEntry>) -> Harness {
    let evidence = Arc::new(InMemoryEvidenceStore::new());
    let events = Arc::new(InMemoryEventLog::new());
    let cases = Arc::new(InMemoryCaseStore::new());
    let fingerprints = Arc::new(InMemoryFingerprintStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let catalog = Arc::new(catalog);

    let handles = EngineHandles {
        parser: Arc::new(FixtureParser),
        evidence: Arc::clone(&evidence) as Arc<dyn EvidenceStore>,
        events: Arc::clone(&events) as Arc<dyn EventLog>,
        cases: Arc::clone(&cases) as Arc<dyn CaseStore>,
        fingerprints: Arc::clone(&fingerprints) as Arc<dyn FingerprintStore>,
        catalog: Arc::clone(&catalog) as Arc<dyn CatalogClient>,
        notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
        clock: Arc::new(LogicalClock::default()),
        sleeper: Arc::new(InstantSleeper),
    };
    let committee = Committee::new(pool, CommitteeConfig::default());
    let matcher = Matcher::new(
        Arc::clone(&catalog) as Arc<dyn CatalogClient>,
        Arc::new(InMemoryMatchCache::new()),
        MatcherConfig::default(),
    );
    let config = EngineConfig {
        retry_standard: RetryPolicy {
            max_attempts: 3,
            initial: Duration::from_millis(1),
            coefficient: 2,
            cap: Duration::from_millis(4),
        },
        retry_aggressive: RetryPolicy {
            max_attempts: 5,
            initial: Duration::from_millis(1),
            coefficient: 2,
            cap: Duration::from_millis(4),
        },
        ..EngineConfig::default()
    };
    Harness {
        engine: WorkflowEngine::new(handles, committee, matcher, config),
        evidence,
        events,
        cases,
        fingerprints,
        notifier,
        catalog,
    }
}

/// Uploads fixture bytes and returns a start request for them.
pub fn start_request(harness: &Harness, case: &str, bytes: &[u8]) -> StartRequest {
    let blob_uri = format!("uploads/{case}.xlsx");
    harness.evidence.put(&blob_uri, bytes).unwrap();
    StartRequest {
        case_id: CaseId::new(case),
        blob_uri,
        tenant_id: TenantId::new("tenant-1"),
        user_id: UserId::new("user-1"),
        correlation_id: None,
        chat_context: ChatThreadId::new("thread-1"),
    }
}

/// Standard catalog for the happy path: one customer, one item at 42.00.
pub fn happy_catalog() -> MockCatalog {
    MockCatalog::with_data(
        vec![CustomerCandidate {
            id: CustomerId::new("cust-1"),
            display_name: "ACME Ltd".to_string(),
        }],
        vec![ItemCandidate {
            id: ItemId::new("item-1"),
            sku: "SKU-001".to_string(),
            gtin: Some("04012345678901".to_string()),
            name: "Widget".to_string(),
            unit_price: Money::from_minor(4_200),
        }],
    )
}
