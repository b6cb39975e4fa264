// crates/orderflow-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: Shared state for the control surface.
// Purpose: Serialize per-case engine access and bound total concurrency.
// Dependencies: orderflow-core, tokio
// ============================================================================

//! ## Overview
//! The engine owns case mutation; the server's job is to make sure only one
//! engine operation runs per case at a time (the case lock) and that the
//! worker never exceeds its activity budget (the semaphore). The active-case
//! set remembers which cases this process has touched so the housekeeping
//! tick can send reminders without a store scan.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use orderflow_core::CaseId;
use orderflow_core::CaseStatus;
use orderflow_core::WorkflowEngine;
use tokio::sync::Semaphore;

use crate::telemetry::ServerMetrics;

// ============================================================================
// SECTION: App State
// ============================================================================

/// Shared control-surface state.
pub struct AppState {
    /// The workflow engine; the single canonical execution path.
    pub engine: Arc<WorkflowEngine>,
    /// Per-case mutexes serializing engine operations.
    locks: Mutex<HashMap<CaseId, Arc<tokio::sync::Mutex<()>>>>,
    /// Bound on concurrently running engine work.
    pub activity_slots: Arc<Semaphore>,
    /// Bound on concurrently progressing background workflow tasks.
    pub workflow_slots: Arc<Semaphore>,
    /// Cases this process has touched, for the reminder tick.
    active: Mutex<BTreeSet<CaseId>>,
    /// Metrics sink.
    pub metrics: Arc<dyn ServerMetrics>,
}

impl AppState {
    /// Creates state over an engine with the given concurrency budgets.
    #[must_use]
    pub fn new(
        engine: Arc<WorkflowEngine>,
        activity_max_concurrency: usize,
        workflow_max_concurrency: usize,
        metrics: Arc<dyn ServerMetrics>,
    ) -> Self {
        Self {
            engine,
            locks: Mutex::new(HashMap::new()),
            activity_slots: Arc::new(Semaphore::new(activity_max_concurrency.max(1))),
            workflow_slots: Arc::new(Semaphore::new(workflow_max_concurrency.max(1))),
            active: Mutex::new(BTreeSet::new()),
            metrics,
        }
    }

    /// Returns the lock serializing operations for one case.
    #[must_use]
    pub fn case_lock(&self, case_id: &CaseId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(case_id.clone()).or_default())
    }

    /// Remembers a case for the reminder tick.
    pub fn track(&self, case_id: &CaseId) {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).insert(case_id.clone());
    }

    /// Returns the tracked cases.
    #[must_use]
    pub fn tracked(&self) -> Vec<CaseId> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    /// Forgets cases that reached a terminal status.
    pub fn forget_if_terminal(&self, case_id: &CaseId, status: CaseStatus) {
        if status.is_terminal() {
            self.active.lock().unwrap_or_else(PoisonError::into_inner).remove(case_id);
        }
    }
}
