// crates/orderflow-core/src/runtime/engine.rs
// ============================================================================
// Module: Orderflow Workflow Engine
// Description: Event-sourced execution of the eight-step order pipeline.
// Purpose: Drive a case from upload to draft creation, durably and replayably.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The engine is the single canonical execution path: every surface (HTTP,
//! CLI, tests) calls these methods. Each operation loads the case, applies
//! deterministic transitions, appends exactly one event per transition, and
//! saves before returning; `advance` runs steps until the case blocks on
//! human input, queues for retry, or terminates. All non-determinism (time,
//! jitter, external reads) enters through activity results or signal
//! payloads, which is what makes the event stream replayable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;

use crate::core::Actor;
use crate::core::ApprovalRecord;
use crate::core::AuditEvent;
use crate::core::BlobPointer;
use crate::core::BucketGranularity;
use crate::core::CanonicalOrder;
use crate::core::CaseState;
use crate::core::CaseStatus;
use crate::core::ColumnCandidate;
use crate::core::CorrectionPatch;
use crate::core::EngineError;
use crate::core::ErrorCode;
use crate::core::ErrorKind;
use crate::core::EventType;
use crate::core::EvidencePack;
use crate::core::MatchStatus;
use crate::core::PendingSelection;
use crate::core::PriceAudit;
use crate::core::ResolvedCustomer;
use crate::core::ResolvedLine;
use crate::core::Timestamp;
use crate::core::corrections::apply_corrections;
use crate::core::date_bucket;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::ChatThreadId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::CustomerId;
use crate::core::identifiers::ItemId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::order_fingerprint;
use crate::core::redact::redact_value;
use crate::core::user_message;
use crate::interfaces::CaseStore;
use crate::interfaces::CaseStoreError;
use crate::interfaces::CatalogClient;
use crate::interfaces::Clock;
use crate::interfaces::DraftLine;
use crate::interfaces::DraftPayload;
use crate::interfaces::EventLog;
use crate::interfaces::EventLogError;
use crate::interfaces::EvidenceStore;
use crate::interfaces::EvidenceStoreError;
use crate::interfaces::FingerprintMetadata;
use crate::interfaces::FingerprintStore;
use crate::interfaces::Notification;
use crate::interfaces::NotificationKind;
use crate::interfaces::Notifier;
use crate::interfaces::OrderParser;
use crate::interfaces::ParseOutcome;
use crate::interfaces::Sleeper;
use crate::runtime::bundle::seal_bundle;
use crate::runtime::committee::Committee;
use crate::runtime::matcher::Matcher;
use crate::runtime::retry::RetryPolicy;
use crate::runtime::retry::run_with_retry;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Canonical fields the committee maps by default.
pub const DEFAULT_EXPECTED_FIELDS: [&str; 6] =
    ["customer", "description", "quantity", "unit_price", "sku", "gtin"];

/// Engine behavior configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Arithmetic-mismatch tolerance in minor units.
    pub tolerance_minor: i64,
    /// Fingerprint date-bucket granularity.
    pub bucket_granularity: BucketGranularity,
    /// Canonical fields the committee must map.
    pub expected_fields: Vec<String>,
    /// Retry policy for storage and matching activities.
    pub retry_standard: RetryPolicy,
    /// Retry policy for catalog draft creation.
    pub retry_aggressive: RetryPolicy,
    /// Inline event payload limit; larger payloads spill to the evidence
    /// store.
    pub large_payload_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerance_minor: 1,
            bucket_granularity: BucketGranularity::Day,
            expected_fields: DEFAULT_EXPECTED_FIELDS.iter().map(ToString::to_string).collect(),
            retry_standard: RetryPolicy::standard(),
            retry_aggressive: RetryPolicy::aggressive(),
            large_payload_bytes: 64 * 1024,
        }
    }
}

// ============================================================================
// SECTION: Requests & Views
// ============================================================================

/// Start request accepted from the control surface.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartRequest {
    /// Case identifier; also the workflow identity.
    pub case_id: CaseId,
    /// Evidence-store path of the uploaded file.
    pub blob_uri: String,
    /// Tenant owning the case.
    pub tenant_id: TenantId,
    /// User who uploaded the file.
    pub user_id: UserId,
    /// Correlation id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Chat thread for notifications.
    pub chat_context: ChatThreadId,
}

/// Outcome of a start request.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    /// False when the case already existed and the run was coalesced.
    pub created: bool,
    /// Current view of the case.
    pub view: StatusView,
}

/// Externally visible case status.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatusView {
    /// Workflow identifier (the case id).
    pub workflow_id: CaseId,
    /// Current status.
    pub status: CaseStatus,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last-update timestamp.
    pub updated_at: Timestamp,
    /// Number of events appended so far.
    pub history_length: u64,
    /// Terminal result payload, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Signals deliverable into a running workflow.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Signal {
    /// Fresh upload after a blocked parse.
    FileReuploaded {
        /// Evidence-store path of the new file.
        new_blob_uri: String,
        /// Correlation id of the re-upload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<CorrelationId>,
    },
    /// Field corrections after a low-confidence verdict.
    CorrectionsSubmitted {
        /// Patches against the current canonical order.
        patches: Vec<CorrectionPatch>,
        /// User submitting the corrections.
        submitted_by: UserId,
    },
    /// Customer and/or item selections.
    SelectionsSubmitted {
        /// Selected customer id, when the case awaits one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        customer: Option<CustomerId>,
        /// Selected item ids per line number.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        items: BTreeMap<u32, ItemId>,
        /// User submitting the selections.
        submitted_by: UserId,
    },
    /// Approval decision.
    ApprovalReceived {
        /// True to approve, false to reject.
        approved: bool,
        /// Deciding user.
        by: UserId,
        /// Optional reviewer comments.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comments: Option<String>,
    },
}

impl Signal {
    /// Stable signal name for events and routing.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FileReuploaded { .. } => "file_reuploaded",
            Self::CorrectionsSubmitted { .. } => "corrections_submitted",
            Self::SelectionsSubmitted { .. } => "selections_submitted",
            Self::ApprovalReceived { .. } => "approval_received",
        }
    }
}

/// Outcome of a signal delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalOutcome {
    /// False when the signal was recorded as ignored.
    pub accepted: bool,
    /// Current view of the case.
    pub view: StatusView,
}

// ============================================================================
// SECTION: Collaborator Handles
// ============================================================================

/// Interface handles owned by the composition root.
#[derive(Clone)]
pub struct EngineHandles {
    /// Spreadsheet parser collaborator.
    pub parser: Arc<dyn OrderParser>,
    /// Evidence store (L1).
    pub evidence: Arc<dyn EvidenceStore>,
    /// Event log (L2).
    pub events: Arc<dyn EventLog>,
    /// Case store (L3).
    pub cases: Arc<dyn CaseStore>,
    /// Fingerprint store (L4).
    pub fingerprints: Arc<dyn FingerprintStore>,
    /// External catalog client (L5).
    pub catalog: Arc<dyn CatalogClient>,
    /// Notification collaborator.
    pub notifier: Arc<dyn Notifier>,
    /// Wall-clock source for the activity layer.
    pub clock: Arc<dyn Clock>,
    /// Sleep primitive for retry backoff.
    pub sleeper: Arc<dyn Sleeper>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Durable workflow engine for order cases.
pub struct WorkflowEngine {
    /// Collaborator handles.
    handles: EngineHandles,
    /// Review committee (M1).
    committee: Committee,
    /// Matching engine (M2).
    matcher: Matcher,
    /// Behavior configuration.
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Creates an engine from the composition root's handles.
    #[must_use]
    pub fn new(
        handles: EngineHandles,
        committee: Committee,
        matcher: Matcher,
        config: EngineConfig,
    ) -> Self {
        Self {
            handles,
            committee,
            matcher,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Starts (or coalesces) a workflow for a case.
    ///
    /// A duplicate start for an existing case never creates a second
    /// execution; the existing view is returned with `created = false`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when storage fails.
    pub fn start(&self, request: StartRequest) -> Result<StartOutcome, EngineError> {
        if let Some(existing) = self.handles.cases.load(&request.case_id).map_err(case_err)? {
            return Ok(StartOutcome {
                created: false,
                view: status_view(&existing),
            });
        }

        let now = self.handles.clock.now();
        let correlation = request
            .correlation_id
            .unwrap_or_else(|| CorrelationId::new(format!("corr-{}", request.case_id)));
        let mut case = CaseState {
            case_id: request.case_id,
            tenant_id: request.tenant_id,
            user_id: request.user_id,
            chat_thread: request.chat_context,
            correlation_id: correlation,
            status: CaseStatus::StoringFile,
            created_at: now,
            updated_at: now,
            execution: 1,
            blob_uri: request.blob_uri,
            file_sha256: None,
            awaiting_reupload: None,
            order_version: 0,
            order_paths: Vec::new(),
            columns: Vec::new(),
            language: None,
            pinned: BTreeMap::new(),
            verdict: None,
            verdict_round: 0,
            resolved_customer: None,
            resolved_lines: Vec::new(),
            pending: None,
            approval: None,
            fingerprint: None,
            external_draft_id: None,
            draft_number: None,
            draft_duplicate: false,
            failure: None,
            next_seq: 1,
            bundle_hash: None,
        };

        let blob_uri = case.blob_uri.clone();
        self.transition(
            &mut case,
            CaseStatus::StoringFile,
            EventType::WorkflowStarted,
            Actor::System,
            json!({ "blob_uri": blob_uri }),
            Vec::new(),
        )?;

        Ok(StartOutcome {
            created: true,
            view: status_view(&case),
        })
    }

    /// Advances a case until it blocks or terminates.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only for storage failures while recording a
    /// terminal failure; pipeline errors are routed to `failed` internally.
    pub fn advance(&self, case_id: &CaseId) -> Result<StatusView, EngineError> {
        let mut case = self.load(case_id)?;
        loop {
            let before = case.status;
            let step = match case.status {
                CaseStatus::StoringFile => self.step_store_file(&mut case),
                CaseStatus::Parsing if case.awaiting_reupload.is_none() => {
                    self.step_parse(&mut case)
                }
                CaseStatus::RunningCommittee => self.step_committee(&mut case),
                CaseStatus::ResolvingCustomer => self.step_resolve_customer(&mut case),
                CaseStatus::ResolvingItems => self.step_resolve_items(&mut case),
                CaseStatus::CreatingDraft => self.step_create_draft(&mut case),
                CaseStatus::Parsing
                | CaseStatus::AwaitingCorrections
                | CaseStatus::AwaitingCustomerSelection
                | CaseStatus::AwaitingItemSelection
                | CaseStatus::AwaitingApproval
                | CaseStatus::QueuedForRetry
                | CaseStatus::Completed
                | CaseStatus::Cancelled
                | CaseStatus::Failed => break,
            };
            if let Err(error) = step {
                self.fail_case(&mut case, &error)?;
                break;
            }
            if case.status == before && case.status.is_human_wait() {
                break;
            }
            if case.status == before && case.awaiting_reupload.is_some() {
                break;
            }
            if case.status.is_terminal() || case.status == CaseStatus::QueuedForRetry {
                break;
            }
        }
        Ok(status_view(&case))
    }

    /// Queries the current case view.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] with `INVALID_REQUEST` for unknown cases.
    pub fn query(&self, case_id: &CaseId) -> Result<StatusView, EngineError> {
        Ok(status_view(&self.load(case_id)?))
    }

    /// Delivers a signal into the workflow.
    ///
    /// Signals arriving out of state are recorded as `signal.ignored` and
    /// otherwise dropped; the outcome reports `accepted = false`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for unknown cases, malformed payloads, or
    /// storage failures.
    pub fn signal(&self, case_id: &CaseId, signal: Signal) -> Result<SignalOutcome, EngineError> {
        let mut case = self.load(case_id)?;
        let accepted = match (&signal, case.status) {
            (Signal::FileReuploaded { .. }, CaseStatus::Parsing) => {
                case.awaiting_reupload.is_some()
            }
            (Signal::CorrectionsSubmitted { .. }, CaseStatus::AwaitingCorrections)
            | (Signal::ApprovalReceived { .. }, CaseStatus::AwaitingApproval) => true,
            (
                Signal::SelectionsSubmitted { customer, .. },
                CaseStatus::AwaitingCustomerSelection,
            ) => customer.is_some(),
            (
                Signal::SelectionsSubmitted { items, .. },
                CaseStatus::AwaitingItemSelection,
            ) => !items.is_empty(),
            _ => false,
        };

        if !accepted {
            let status = case.status;
            self.append_event(
                &mut case,
                EventType::SignalIgnored,
                Actor::System,
                Some(json!({
                    "signal": signal.name(),
                    "status": status,
                })),
                Vec::new(),
            )?;
            self.handles.cases.save(&case).map_err(case_err)?;
            return Ok(SignalOutcome {
                accepted: false,
                view: status_view(&case),
            });
        }

        match signal {
            Signal::FileReuploaded {
                new_blob_uri,
                correlation_id,
            } => self.apply_reupload(&mut case, new_blob_uri, correlation_id)?,
            Signal::CorrectionsSubmitted {
                patches,
                submitted_by,
            } => self.apply_corrections_signal(&mut case, &patches, &submitted_by)?,
            Signal::SelectionsSubmitted {
                customer,
                items,
                submitted_by,
            } => self.apply_selections(&mut case, customer, &items, &submitted_by)?,
            Signal::ApprovalReceived {
                approved,
                by,
                comments,
            } => self.apply_approval(&mut case, approved, by, comments)?,
        }

        Ok(SignalOutcome {
            accepted: true,
            view: status_view(&case),
        })
    }

    /// Terminates a workflow administratively.
    ///
    /// The cancellation event and sealed bundle are persisted before the
    /// terminal status is visible.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for unknown cases or storage failures.
    pub fn terminate(&self, case_id: &CaseId, reason: &str) -> Result<StatusView, EngineError> {
        let mut case = self.load(case_id)?;
        if case.status.is_terminal() {
            return Ok(status_view(&case));
        }
        self.transition(
            &mut case,
            CaseStatus::Cancelled,
            EventType::WorkflowCancelled,
            Actor::System,
            json!({ "reason": reason }),
            Vec::new(),
        )?;
        self.seal(&mut case)?;
        self.notify(&mut case, NotificationKind::Cancelled, "The order was cancelled.", None)?;
        Ok(status_view(&case))
    }

    /// Sends a reminder for a case parked in a human-wait state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for unknown cases or storage failures.
    pub fn remind(&self, case_id: &CaseId) -> Result<(), EngineError> {
        let mut case = self.load(case_id)?;
        if case.status.is_human_wait() || case.awaiting_reupload.is_some() {
            self.notify(
                &mut case,
                NotificationKind::Reminder,
                "This order is still waiting for your input.",
                None,
            )?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pipeline steps
    // ------------------------------------------------------------------

    /// Step 1: persist the uploaded file and digest it.
    fn step_store_file(&self, case: &mut CaseState) -> Result<(), EngineError> {
        let blob_uri = case.blob_uri.clone();
        let bytes = run_with_retry(self.config.retry_standard, &*self.handles.sleeper, |_| {
            self.handles.evidence.get(&blob_uri).map_err(evidence_err)
        })?;

        let dest = original_path(case);
        let sha256 = run_with_retry(self.config.retry_standard, &*self.handles.sleeper, |_| {
            self.handles.evidence.put(&dest, &bytes).map_err(evidence_err)
        })?;
        case.file_sha256 = Some(sha256.clone());

        self.transition(
            case,
            CaseStatus::Parsing,
            EventType::FileStored,
            Actor::System,
            json!({ "path": dest, "sha256": sha256 }),
            vec![BlobPointer {
                path: dest,
                sha256,
            }],
        )
    }

    /// Step 2: parse the stored file into a canonical order.
    fn step_parse(&self, case: &mut CaseState) -> Result<(), EngineError> {
        let path = original_path(case);
        let bytes = run_with_retry(self.config.retry_standard, &*self.handles.sleeper, |_| {
            self.handles.evidence.get(&path).map_err(evidence_err)
        })?;
        let filename = case.blob_uri.rsplit('/').next().unwrap_or("upload.xlsx").to_string();

        let outcome = run_with_retry(self.config.retry_standard, &*self.handles.sleeper, |_| {
            self.handles.parser.parse(&filename, &bytes).map_err(|err| {
                EngineError::new(ErrorCode::StorageUnavailable, err.to_string())
            })
        })?;

        match outcome {
            ParseOutcome::Blocked { reason } => {
                case.awaiting_reupload = Some(reason);
                self.transition(
                    case,
                    CaseStatus::Parsing,
                    EventType::ParseBlocked,
                    Actor::System,
                    json!({ "reason": reason }),
                    Vec::new(),
                )?;
                self.notify(
                    case,
                    NotificationKind::ReuploadNeeded,
                    user_message(ErrorCode::BlockedFile),
                    Some("Re-upload the order as a plain spreadsheet."),
                )
            }
            ParseOutcome::Parsed {
                mut order,
                columns,
                language,
            } => {
                order.version = case.order_version + 1;
                if let Some(sha256) = &case.file_sha256 {
                    order.meta.file_sha256 = sha256.clone();
                }
                order.validate(self.config.tolerance_minor);
                let pointer = self.persist_order(case, &order)?;
                case.columns = columns;
                case.language = language;
                self.transition(
                    case,
                    CaseStatus::RunningCommittee,
                    EventType::ParseSucceeded,
                    Actor::System,
                    json!({
                        "version": order.version,
                        "lines": order.lines.len(),
                        "issues": order.issues.len(),
                    }),
                    vec![pointer],
                )
            }
        }
    }

    /// Step 3: run the review committee over the current order version.
    fn step_committee(&self, case: &mut CaseState) -> Result<(), EngineError> {
        let round = case.verdict_round + 1;
        let pack = self.build_pack(case);

        let pack_path = format!("{}/committee/r{round}/pack.json", case.case_id);
        let pack_pointer = self.persist_json(&pack_path, &pack)?;
        self.append_event(
            case,
            EventType::CommitteeSelected,
            Actor::System,
            Some(json!({
                "round": round,
                "providers": self
                    .committee
                    .select()
                    .iter()
                    .map(|entry| entry.spec.id.as_str())
                    .collect::<Vec<_>>(),
            })),
            vec![pack_pointer],
        )?;

        let prompt = self.committee.build_prompt(&pack);
        let (outputs, verdict) = self.committee.run(&pack);

        for output in &outputs {
            let base = format!("{}/committee/r{round}/{}", case.case_id, output.provider_id);
            let prompt_pointer = self.persist_bytes(&format!("{base}/prompt.txt"), prompt.as_bytes())?;
            let response_pointer =
                self.persist_bytes(&format!("{base}/response.json"), output.raw_response.as_bytes())?;
            self.append_event(
                case,
                EventType::CommitteeProviderCalled,
                Actor::Provider(output.provider_id.clone()),
                Some(json!({
                    "round": round,
                    "outcome": output.outcome,
                    "latency_ms": output.latency_ms,
                    "weight": output.weight,
                })),
                vec![prompt_pointer, response_pointer],
            )?;
        }

        let verdict_path = format!("{}/verdict/v{round}.json", case.case_id);
        let verdict_pointer = self.persist_json(&verdict_path, &verdict)?;
        case.verdict = Some(verdict.clone());
        case.verdict_round = round;

        let (next_status, notification) = if verdict.needs_human {
            (CaseStatus::AwaitingCorrections, Some(NotificationKind::CorrectionsNeeded))
        } else {
            (CaseStatus::ResolvingCustomer, None)
        };
        self.transition(
            case,
            next_status,
            EventType::CommitteeVerdict,
            Actor::System,
            json!({
                "round": round,
                "consensus": verdict.consensus,
                "needs_human": verdict.needs_human,
                "overall_confidence": verdict.overall_confidence,
                "disagreements": verdict.disagreements.len(),
            }),
            vec![verdict_pointer],
        )?;
        if let Some(kind) = notification {
            self.notify(
                case,
                kind,
                user_message(ErrorCode::CommitteeDisagreement),
                Some("Review the highlighted fields and submit corrections."),
            )?;
        }
        Ok(())
    }

    /// Step 4: resolve the customer block against the catalog.
    fn step_resolve_customer(&self, case: &mut CaseState) -> Result<(), EngineError> {
        let order = self.load_order(case)?;
        let name = order.customer.name.clone();
        let tenant = case.tenant_id.clone();
        let result = run_with_retry(self.config.retry_standard, &*self.handles.sleeper, |_| {
            self.matcher.match_customer(&name, &tenant, self.handles.clock.now())
        })?;

        if result.stale_cache {
            self.record_stale_cache(case, "customer")?;
        }

        if result.status == MatchStatus::Resolved
            && let Some(customer_id) = result.customer_id
        {
            let display_name = result
                .candidates
                .first()
                .map_or_else(|| name.clone(), |candidate| candidate.label.clone());
            let confidence = result.candidates.first().map_or(1.0, |candidate| candidate.score);
            case.resolved_customer = Some(ResolvedCustomer {
                customer_id: customer_id.clone(),
                display_name,
                confidence,
                selected_by_user: false,
            });
            return self.transition(
                case,
                CaseStatus::ResolvingItems,
                EventType::CustomerResolved,
                Actor::System,
                json!({ "customer_id": customer_id, "confidence": confidence }),
                Vec::new(),
            );
        }

        let code = match result.status {
            MatchStatus::Ambiguous => ErrorCode::CustomerAmbiguous,
            _ => ErrorCode::CustomerNotFound,
        };
        case.pending = Some(PendingSelection {
            customer_candidates: result.candidates.clone(),
            item_candidates: BTreeMap::new(),
        });
        self.transition(
            case,
            CaseStatus::AwaitingCustomerSelection,
            EventType::CustomerSelectionRequested,
            Actor::System,
            json!({
                "code": code,
                "candidates": result.candidates,
            }),
            Vec::new(),
        )?;
        self.notify(
            case,
            NotificationKind::CustomerSelectionNeeded,
            user_message(code),
            Some("Pick the right customer from the candidates."),
        )
    }

    /// Step 5: resolve every unresolved line against the catalog.
    fn step_resolve_items(&self, case: &mut CaseState) -> Result<(), EngineError> {
        let order = self.load_order(case)?;
        let tenant = case.tenant_id.clone();
        let already: Vec<u32> =
            case.resolved_lines.iter().map(|line| line.line_number).collect();

        let mut unresolved = BTreeMap::new();
        let mut any_stale = false;
        for line in &order.lines {
            if already.contains(&line.line_number) {
                continue;
            }
            let result = run_with_retry(self.config.retry_standard, &*self.handles.sleeper, |_| {
                self.matcher.match_item(line, &tenant, self.handles.clock.now())
            })?;
            any_stale |= result.stale_cache;
            if result.status == MatchStatus::Resolved
                && let (Some(item_id), Some(price)) = (result.item_id.clone(), result.catalog_price)
            {
                case.resolved_lines.push(ResolvedLine {
                    line_number: line.line_number,
                    item_id,
                    catalog_price: price,
                    price_audit: PriceAudit::compare(line.line_number, line.unit_price, price),
                    selected_by_user: false,
                });
            } else {
                unresolved.insert(line.line_number, result.candidates);
            }
        }
        case.resolved_lines.sort_by_key(|line| line.line_number);

        if any_stale {
            self.record_stale_cache(case, "items")?;
        }

        if unresolved.is_empty() {
            self.append_event(
                case,
                EventType::ItemsResolved,
                Actor::System,
                Some(json!({ "resolved": case.resolved_lines.len() })),
                Vec::new(),
            )?;
            self.transition(
                case,
                CaseStatus::AwaitingApproval,
                EventType::ApprovalRequested,
                Actor::System,
                json!({ "lines": case.resolved_lines.len() }),
                Vec::new(),
            )?;
            return self.notify(
                case,
                NotificationKind::ReadyForApproval,
                "The order is ready for your approval.",
                Some("Approve or reject the order."),
            );
        }

        let pending = case.pending.get_or_insert_with(PendingSelection::default);
        pending.item_candidates = unresolved.clone();
        self.transition(
            case,
            CaseStatus::AwaitingItemSelection,
            EventType::ItemSelectionRequested,
            Actor::System,
            json!({
                "code": ErrorCode::ItemsUnresolved,
                "lines": unresolved.keys().collect::<Vec<_>>(),
            }),
            Vec::new(),
        )?;
        self.notify(
            case,
            NotificationKind::ItemSelectionNeeded,
            user_message(ErrorCode::ItemsUnresolved),
            Some("Pick catalog items for the unresolved lines."),
        )
    }

    /// Step 7: create the external draft at most once.
    fn step_create_draft(&self, case: &mut CaseState) -> Result<(), EngineError> {
        let order = self.load_order(case)?;
        let customer = case.resolved_customer.clone().ok_or_else(|| {
            EngineError::new(ErrorCode::InvariantViolated, "draft creation without a customer")
        })?;
        let file_sha256 = case.file_sha256.clone().ok_or_else(|| {
            EngineError::new(ErrorCode::InvariantViolated, "draft creation without a file digest")
        })?;

        let now = self.handles.clock.now();
        let bucket = date_bucket(now.as_millis(), self.config.bucket_granularity);
        let fingerprint =
            order_fingerprint(&file_sha256, &customer.customer_id, &order.lines, &bucket)
                .map_err(|err| EngineError::new(ErrorCode::InvariantViolated, err.to_string()))?;
        case.fingerprint = Some(fingerprint.clone());

        let existing = run_with_retry(self.config.retry_standard, &*self.handles.sleeper, |_| {
            self.handles.fingerprints.lookup(&fingerprint).map_err(|err| {
                EngineError::new(ErrorCode::StorageUnavailable, err.to_string())
            })
        })?;
        if let Some(draft_id) = existing {
            case.external_draft_id = Some(draft_id.clone());
            case.draft_duplicate = true;
            self.append_event(
                case,
                EventType::DraftDeduplicated,
                Actor::System,
                Some(json!({
                    "draft_id": draft_id,
                    "fingerprint": fingerprint,
                    "is_duplicate": true,
                })),
                Vec::new(),
            )?;
            return self.step_finalize(case);
        }

        let payload = DraftPayload {
            tenant_id: case.tenant_id.clone(),
            customer_id: customer.customer_id.clone(),
            lines: case
                .resolved_lines
                .iter()
                .map(|resolved| {
                    let quantity = order
                        .lines
                        .iter()
                        .find(|line| line.line_number == resolved.line_number)
                        .map_or(0.0, |line| line.quantity);
                    DraftLine {
                        item_id: resolved.item_id.clone(),
                        quantity,
                        unit_price: resolved.catalog_price,
                    }
                })
                .collect(),
            case_id: case.case_id.clone(),
        };

        let request_pointer = self
            .persist_json(&format!("{}/external/request.json", case.case_id), &payload)?;

        let created = run_with_retry(self.config.retry_aggressive, &*self.handles.sleeper, |_| {
            self.handles.catalog.create_draft(&payload, &fingerprint)
        });

        match created {
            Ok(receipt) => {
                let response_pointer = self.persist_json(
                    &format!("{}/external/response.json", case.case_id),
                    &receipt,
                )?;
                let metadata = FingerprintMetadata {
                    case_id: case.case_id.clone(),
                    tenant_id: case.tenant_id.clone(),
                    registered_at: self.handles.clock.now(),
                };
                let winner = run_with_retry(
                    self.config.retry_standard,
                    &*self.handles.sleeper,
                    |_| {
                        self.handles
                            .fingerprints
                            .register(&fingerprint, &receipt.draft_id, &metadata)
                            .map_err(|err| {
                                EngineError::new(ErrorCode::StorageUnavailable, err.to_string())
                            })
                    },
                )?;
                self.append_event(
                    case,
                    EventType::FingerprintRegistered,
                    Actor::System,
                    Some(json!({ "fingerprint": fingerprint, "draft_id": winner })),
                    Vec::new(),
                )?;
                case.external_draft_id = Some(winner.clone());
                case.draft_number = Some(receipt.draft_number.clone());
                case.draft_duplicate = receipt.is_duplicate || winner != receipt.draft_id;
                self.append_event(
                    case,
                    EventType::DraftCreated,
                    Actor::System,
                    Some(json!({
                        "draft_id": winner,
                        "draft_number": receipt.draft_number,
                        "is_duplicate": case.draft_duplicate,
                        "fingerprint": fingerprint,
                    })),
                    vec![request_pointer, response_pointer],
                )?;
                self.step_finalize(case)
            }
            Err(error) if error.kind() == ErrorKind::Transient => {
                case.failure = Some(error.code);
                self.transition(
                    case,
                    CaseStatus::QueuedForRetry,
                    EventType::WorkflowQueuedForRetry,
                    Actor::System,
                    json!({
                        "code": error.code,
                        "detail": error.message,
                        "fingerprint": fingerprint,
                    }),
                    Vec::new(),
                )?;
                self.seal(case)?;
                self.notify(case, NotificationKind::QueuedForRetry, user_message(error.code), None)
            }
            Err(error) => Err(error),
        }
    }

    /// Step 8: finalize a successful case.
    fn step_finalize(&self, case: &mut CaseState) -> Result<(), EngineError> {
        let result = json!({
            "draft_id": case.external_draft_id,
            "draft_number": case.draft_number,
            "is_duplicate": case.draft_duplicate,
        });
        self.transition(
            case,
            CaseStatus::Completed,
            EventType::WorkflowCompleted,
            Actor::System,
            result,
            Vec::new(),
        )?;
        self.seal(case)?;
        self.notify(case, NotificationKind::Complete, "The draft order was created.", None)
    }

    // ------------------------------------------------------------------
    // Signal application
    // ------------------------------------------------------------------

    /// Continues the case as a new execution with a fresh upload.
    fn apply_reupload(
        &self,
        case: &mut CaseState,
        new_blob_uri: String,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), EngineError> {
        let previous_execution = case.execution;
        case.execution += 1;
        case.blob_uri = new_blob_uri.clone();
        case.awaiting_reupload = None;
        case.file_sha256 = None;
        case.columns = Vec::new();
        case.language = None;
        if let Some(correlation) = correlation_id {
            case.correlation_id = correlation;
        }
        self.transition(
            case,
            CaseStatus::StoringFile,
            EventType::WorkflowContinued,
            Actor::User(case.user_id.clone()),
            json!({
                "previous_execution_id": previous_execution,
                "new_blob_uri": new_blob_uri,
            }),
            Vec::new(),
        )
    }

    /// Applies correction patches and re-queues the committee.
    fn apply_corrections_signal(
        &self,
        case: &mut CaseState,
        patches: &[CorrectionPatch],
        submitted_by: &UserId,
    ) -> Result<(), EngineError> {
        let order = self.load_order(case)?;
        let (next, pins) = apply_corrections(&order, patches, self.config.tolerance_minor)
            .map_err(|err| EngineError::new(ErrorCode::InvalidRequest, err.to_string()))?;
        case.pinned.extend(pins);

        let now = self.handles.clock.now();
        let patch_path = format!("{}/corrections/{}.json", case.case_id, now.as_millis());
        let patch_pointer = self.persist_json(&patch_path, &patches)?;
        let order_pointer = self.persist_order(case, &next)?;

        self.transition(
            case,
            CaseStatus::RunningCommittee,
            EventType::CorrectionsApplied,
            Actor::User(submitted_by.clone()),
            json!({
                "version": next.version,
                "patches": patches.len(),
            }),
            vec![patch_pointer, order_pointer],
        )
    }

    /// Applies customer and/or item selections.
    fn apply_selections(
        &self,
        case: &mut CaseState,
        customer: Option<CustomerId>,
        items: &BTreeMap<u32, ItemId>,
        submitted_by: &UserId,
    ) -> Result<(), EngineError> {
        if case.status == CaseStatus::AwaitingCustomerSelection {
            let selected = customer.ok_or_else(|| {
                EngineError::new(ErrorCode::InvalidRequest, "customer selection required")
            })?;
            let pending = case.pending.take().unwrap_or_default();
            let candidate = pending
                .customer_candidates
                .iter()
                .find(|candidate| candidate.id == selected.as_str())
                .ok_or_else(|| {
                    EngineError::new(
                        ErrorCode::InvalidRequest,
                        format!("customer {selected} was not among the offered candidates"),
                    )
                })?;
            case.resolved_customer = Some(ResolvedCustomer {
                customer_id: selected.clone(),
                display_name: candidate.label.clone(),
                confidence: 1.0,
                selected_by_user: true,
            });
            return self.transition(
                case,
                CaseStatus::ResolvingItems,
                EventType::CustomerSelected,
                Actor::User(submitted_by.clone()),
                json!({ "customer_id": selected }),
                Vec::new(),
            );
        }

        let order = self.load_order(case)?;
        let pending = case.pending.clone().unwrap_or_default();
        for (line_number, item_id) in items {
            let candidates = pending.item_candidates.get(line_number).ok_or_else(|| {
                EngineError::new(
                    ErrorCode::InvalidRequest,
                    format!("line {line_number} has no pending selection"),
                )
            })?;
            let candidate = candidates
                .iter()
                .find(|candidate| candidate.id == item_id.as_str())
                .ok_or_else(|| {
                    EngineError::new(
                        ErrorCode::InvalidRequest,
                        format!("item {item_id} was not among the offered candidates"),
                    )
                })?;
            let price = candidate.unit_price.ok_or_else(|| {
                EngineError::new(
                    ErrorCode::InvariantViolated,
                    format!("candidate {item_id} carries no catalog price"),
                )
            })?;
            let sheet_price = order
                .lines
                .iter()
                .find(|line| line.line_number == *line_number)
                .and_then(|line| line.unit_price);
            case.resolved_lines.push(ResolvedLine {
                line_number: *line_number,
                item_id: item_id.clone(),
                catalog_price: price,
                price_audit: PriceAudit::compare(*line_number, sheet_price, price),
                selected_by_user: true,
            });
        }
        case.resolved_lines.sort_by_key(|line| line.line_number);
        if let Some(pending) = case.pending.as_mut() {
            for line_number in items.keys() {
                pending.item_candidates.remove(line_number);
            }
        }

        self.transition(
            case,
            CaseStatus::ResolvingItems,
            EventType::ItemsSelected,
            Actor::User(submitted_by.clone()),
            json!({ "lines": items.keys().collect::<Vec<_>>() }),
            Vec::new(),
        )
    }

    /// Applies the approval decision.
    fn apply_approval(
        &self,
        case: &mut CaseState,
        approved: bool,
        by: UserId,
        comments: Option<String>,
    ) -> Result<(), EngineError> {
        case.approval = Some(ApprovalRecord {
            approved,
            by: by.clone(),
            comments: comments.clone(),
        });
        if approved {
            self.transition(
                case,
                CaseStatus::CreatingDraft,
                EventType::ApprovalReceived,
                Actor::User(by),
                json!({ "approved": true }),
                Vec::new(),
            )
        } else {
            self.transition(
                case,
                CaseStatus::Cancelled,
                EventType::ApprovalReceived,
                Actor::User(by),
                json!({ "approved": false, "comments": comments }),
                Vec::new(),
            )?;
            self.seal(case)?;
            self.notify(case, NotificationKind::Cancelled, "The order was rejected.", None)
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Loads a case or classifies its absence as an invalid request.
    fn load(&self, case_id: &CaseId) -> Result<CaseState, EngineError> {
        self.handles
            .cases
            .load(case_id)
            .map_err(case_err)?
            .ok_or_else(|| EngineError::new(ErrorCode::InvalidRequest, format!("unknown case {case_id}")))
    }

    /// Loads the current canonical-order version from the evidence store.
    fn load_order(&self, case: &CaseState) -> Result<CanonicalOrder, EngineError> {
        let path = case.current_order_path().ok_or_else(|| {
            EngineError::new(ErrorCode::InvariantViolated, "no canonical order persisted")
        })?;
        let bytes = self.handles.evidence.get(path).map_err(evidence_err)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| EngineError::new(ErrorCode::InvariantViolated, err.to_string()))
    }

    /// Persists a canonical-order version and tracks it on the case.
    fn persist_order(
        &self,
        case: &mut CaseState,
        order: &CanonicalOrder,
    ) -> Result<BlobPointer, EngineError> {
        let path = format!("{}/canonical/v{}.json", case.case_id, order.version);
        let pointer = self.persist_json(&path, order)?;
        case.order_version = order.version;
        case.order_paths.push(path);
        Ok(pointer)
    }

    /// Persists a JSON artifact, returning its pointer.
    fn persist_json<T: serde::Serialize>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<BlobPointer, EngineError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|err| EngineError::new(ErrorCode::InvariantViolated, err.to_string()))?;
        self.persist_bytes(path, &bytes)
    }

    /// Persists raw bytes, returning their pointer.
    fn persist_bytes(&self, path: &str, bytes: &[u8]) -> Result<BlobPointer, EngineError> {
        let sha256 = run_with_retry(self.config.retry_standard, &*self.handles.sleeper, |_| {
            self.handles.evidence.put(path, bytes).map_err(evidence_err)
        })?;
        Ok(BlobPointer {
            path: path.to_string(),
            sha256,
        })
    }

    /// Appends one event with redaction and large-payload spill.
    fn append_event(
        &self,
        case: &mut CaseState,
        event_type: EventType,
        actor: Actor,
        data: Option<Value>,
        mut pointers: Vec<BlobPointer>,
    ) -> Result<(), EngineError> {
        let ts = self.handles.clock.now();
        let mut redactions = Vec::new();
        let mut data = data;
        if let Some(payload) = data.as_mut() {
            redactions = redact_value(payload);
            let rendered = payload.to_string();
            if rendered.len() > self.config.large_payload_bytes {
                let spill_path = format!("{}/events/{}.json", case.case_id, case.next_seq);
                let pointer = self.persist_bytes(&spill_path, rendered.as_bytes())?;
                pointers.push(pointer);
                data = Some(json!({ "spilled": true }));
            }
        }

        let event = AuditEvent {
            seq: case.next_seq,
            ts,
            case_id: case.case_id.clone(),
            tenant_id: case.tenant_id.clone(),
            event_type,
            actor,
            correlation: Some(case.correlation_id.clone()),
            data,
            pointers,
            redactions,
        };
        self.handles.events.append(&event).map_err(event_err)?;
        case.next_seq += 1;
        case.updated_at = ts;
        // The snapshot follows the durable append so a crash never leaves the
        // case ahead of its own history.
        self.handles.cases.save(case).map_err(case_err)
    }

    /// Applies a status transition with its single event, then saves.
    fn transition(
        &self,
        case: &mut CaseState,
        next_status: CaseStatus,
        event_type: EventType,
        actor: Actor,
        data: Value,
        pointers: Vec<BlobPointer>,
    ) -> Result<(), EngineError> {
        case.status = next_status;
        let mut data = data;
        if let Value::Object(map) = &mut data {
            map.insert(
                "status".to_string(),
                serde_json::to_value(next_status)
                    .map_err(|err| EngineError::new(ErrorCode::InvariantViolated, err.to_string()))?,
            );
        }
        self.append_event(case, event_type, actor, Some(data), pointers)
    }

    /// Routes a step failure to terminal `failed` with a sealed bundle.
    fn fail_case(&self, case: &mut CaseState, error: &EngineError) -> Result<(), EngineError> {
        case.failure = Some(error.code);
        self.transition(
            case,
            CaseStatus::Failed,
            EventType::WorkflowFailed,
            Actor::System,
            json!({ "code": error.code, "detail": error.message }),
            Vec::new(),
        )?;
        self.seal(case)?;
        self.notify(case, NotificationKind::Failed, user_message(error.code), None)
    }

    /// Seals the audit bundle and records its digest on the case.
    fn seal(&self, case: &mut CaseState) -> Result<(), EngineError> {
        let finalized_at = self.handles.clock.now();
        let (_, manifest_hash, _) = seal_bundle(
            &*self.handles.evidence,
            &*self.handles.events,
            &case.case_id,
            case.status,
            finalized_at,
        )
        .map_err(|err| EngineError::new(ErrorCode::StorageUnavailable, err.to_string()))?;
        case.bundle_hash = Some(manifest_hash);
        self.handles.cases.save(case).map_err(case_err)
    }

    /// Delivers a notification and records the attempt.
    fn notify(
        &self,
        case: &mut CaseState,
        kind: NotificationKind,
        message: &str,
        next_step: Option<&str>,
    ) -> Result<(), EngineError> {
        let notification = Notification {
            case_id: case.case_id.clone(),
            thread: case.chat_thread.clone(),
            kind,
            message: message.to_string(),
            reference: case.correlation_id.clone(),
            next_step: next_step.map(ToString::to_string),
        };
        let delivery = self.handles.notifier.notify(&notification);
        self.append_event(
            case,
            EventType::NotificationSent,
            Actor::System,
            Some(json!({
                "kind": kind,
                "delivered": delivery.is_ok(),
            })),
            Vec::new(),
        )
    }

    /// Records a stale-cache note in the event log.
    fn record_stale_cache(&self, case: &mut CaseState, scope: &str) -> Result<(), EngineError> {
        self.append_event(
            case,
            EventType::StaleCacheServed,
            Actor::System,
            Some(json!({ "scope": scope })),
            Vec::new(),
        )
    }

    /// Builds the committee evidence pack from parser columns.
    fn build_pack(&self, case: &CaseState) -> EvidencePack {
        let sample_cap = self.committee.config().sample_cap;
        let candidates: Vec<ColumnCandidate> = case
            .columns
            .iter()
            .map(|column| {
                let samples = column
                    .samples
                    .iter()
                    .take(sample_cap)
                    .map(|sample| crate::core::redact::redact_text(sample).0)
                    .collect();
                ColumnCandidate {
                    column_id: column.column_id.clone(),
                    header: column.header.clone(),
                    samples,
                    stats: column.stats,
                }
            })
            .collect();
        EvidencePack {
            candidates,
            expected_fields: self.config.expected_fields.clone(),
            language: case.language.clone(),
            pinned: case.pinned.clone(),
        }
    }
}

// ============================================================================
// SECTION: Free Helpers
// ============================================================================

/// Evidence-store path of the current execution's original file.
fn original_path(case: &CaseState) -> String {
    if case.execution == 1 {
        format!("{}/original.xlsx", case.case_id)
    } else {
        format!("{}/original.e{}.xlsx", case.case_id, case.execution)
    }
}

/// Builds the externally visible view of a case.
fn status_view(case: &CaseState) -> StatusView {
    let result = if case.status == CaseStatus::Completed {
        Some(json!({
            "draft_id": case.external_draft_id,
            "draft_number": case.draft_number,
            "is_duplicate": case.draft_duplicate,
        }))
    } else if case.status.is_terminal() || case.status == CaseStatus::QueuedForRetry {
        case.failure.map(|code| json!({ "code": code }))
    } else {
        None
    };
    StatusView {
        workflow_id: case.case_id.clone(),
        status: case.status,
        created_at: case.created_at,
        updated_at: case.updated_at,
        history_length: case.history_length(),
        result,
    }
}

/// Classifies evidence-store failures.
fn evidence_err(error: EvidenceStoreError) -> EngineError {
    match error {
        EvidenceStoreError::Unavailable(detail) => {
            EngineError::new(ErrorCode::StorageUnavailable, detail)
        }
        EvidenceStoreError::NotFound(path) => {
            EngineError::new(ErrorCode::ValidationFailed, format!("missing blob {path}"))
        }
        EvidenceStoreError::Immutable(path) => EngineError::new(
            ErrorCode::InvariantViolated,
            format!("attempted rewrite of sealed path {path}"),
        ),
        EvidenceStoreError::InvalidPath(path) => {
            EngineError::new(ErrorCode::InvalidRequest, format!("invalid path {path}"))
        }
    }
}

/// Classifies event-log failures.
fn event_err(error: EventLogError) -> EngineError {
    match error {
        EventLogError::Unavailable(detail) => {
            EngineError::new(ErrorCode::StorageUnavailable, detail)
        }
        EventLogError::SequenceViolation { .. } | EventLogError::Corrupt(_) => {
            EngineError::new(ErrorCode::EventLogGap, error.to_string())
        }
    }
}

/// Classifies case-store failures.
fn case_err(error: CaseStoreError) -> EngineError {
    match error {
        CaseStoreError::Unavailable(detail) => {
            EngineError::new(ErrorCode::StorageUnavailable, detail)
        }
        CaseStoreError::Corrupt(detail) => EngineError::new(ErrorCode::InvariantViolated, detail),
    }
}
