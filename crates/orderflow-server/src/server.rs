// crates/orderflow-server/src/server.rs
// ============================================================================
// Module: Control Surface HTTP
// Description: Axum routes for start, status, signals, queries, and probes.
// Purpose: Thin adapter from HTTP onto the workflow engine.
// Dependencies: axum, orderflow-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! Every route validates its arguments, acquires the per-case lock plus an
//! activity slot, runs the engine call on the blocking pool, and maps the
//! outcome onto the documented statuses: 202 for accepted starts and
//! signals, 409 for duplicate starts and out-of-state signals, 404 for
//! unknown workflows. Start and accepted signals schedule a background
//! `advance` so the pipeline makes progress without the caller waiting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use orderflow_core::CaseId;
use orderflow_core::CorrelationId;
use orderflow_core::EngineError;
use orderflow_core::ErrorCode;
use orderflow_core::Signal;
use orderflow_core::StartRequest;
use orderflow_core::WorkflowEngine;
use rand::Rng;
use serde_json::Value;
use serde_json::json;

use crate::state::AppState;
use crate::telemetry::RequestOutcome;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Control-surface runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind: String,
    /// Reminder cadence for human-wait cases.
    pub reminder_interval: Duration,
    /// Drain grace period after a shutdown signal.
    pub shutdown_grace: Duration,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the control-surface router.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/workflow/start", post(start_workflow))
        .route("/workflow/{id}/status", get(workflow_status))
        .route("/workflow/{id}/signal/{name}", post(deliver_signal))
        .route("/workflow/{id}/terminate", post(terminate_workflow))
        .route("/workflow/{id}/cancel", post(cancel_workflow))
        .route("/workflow/{id}/query/{name}", get(query_workflow))
        .route("/health", get(health))
        .route("/live", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

/// Runs the control surface until a shutdown signal, then drains.
///
/// # Errors
///
/// Returns an [`std::io::Error`] when the listener cannot bind or serving
/// fails.
pub async fn run_server(config: ServerConfig, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, "control surface listening");

    let reminder_state = Arc::clone(&state);
    let reminder_interval = config.reminder_interval;
    let reminders = tokio::spawn(async move {
        let mut tick = tokio::time::interval(reminder_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            remind_waiting_cases(&reminder_state).await;
        }
    });

    let grace = config.shutdown_grace;
    let result = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal(grace))
        .await;
    reminders.abort();
    result
}

/// Resolves when the process receives SIGTERM or ctrl-c.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        let _ignored = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!(grace_secs = grace.as_secs(), "shutdown signal received, draining");
}

/// Sends reminders for tracked cases still waiting on human input.
async fn remind_waiting_cases(state: &Arc<AppState>) {
    for case_id in state.tracked() {
        let outcome = run_engine(state, &case_id, move |engine, case_id| {
            engine.remind(case_id).map(|()| ())
        })
        .await;
        if let Err(error) = outcome {
            tracing::warn!(case = %case_id, %error, "reminder failed");
        }
    }
}

// ============================================================================
// SECTION: Engine Bridge
// ============================================================================

/// Runs one engine operation under the case lock and an activity slot.
async fn run_engine<T: Send + 'static>(
    state: &Arc<AppState>,
    case_id: &CaseId,
    operation: impl FnOnce(&WorkflowEngine, &CaseId) -> Result<T, EngineError> + Send + 'static,
) -> Result<T, EngineError> {
    let permit = Arc::clone(&state.activity_slots).acquire_owned().await.ok();
    let lock = state.case_lock(case_id);
    let guard = lock.lock_owned().await;
    let engine = Arc::clone(&state.engine);
    let case_id = case_id.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let result = operation(&engine, &case_id);
        drop(guard);
        drop(permit);
        result
    })
    .await;
    joined.unwrap_or_else(|err| {
        Err(EngineError::new(ErrorCode::InvariantViolated, format!("engine task panicked: {err}")))
    })
}

/// Schedules a background advance for a case.
fn schedule_advance(state: &Arc<AppState>, case_id: CaseId) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let _workflow_slot = Arc::clone(&state.workflow_slots).acquire_owned().await.ok();
        let advanced =
            run_engine(&state, &case_id, |engine, case_id| engine.advance(case_id)).await;
        match advanced {
            Ok(view) => state.forget_if_terminal(&case_id, view.status),
            Err(error) => {
                tracing::error!(case = %case_id, %error, "background advance failed");
            }
        }
    });
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /workflow/start`.
async fn start_workflow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut request): Json<StartRequest>,
) -> Response {
    let started = Instant::now();
    if request.case_id.as_str().trim().is_empty() || request.blob_uri.trim().is_empty() {
        state.metrics.record("workflow.start", RequestOutcome::Rejected, elapsed_ms(started));
        return error_body(StatusCode::BAD_REQUEST, "case_id and blob_uri are required");
    }
    if request.correlation_id.is_none() {
        request.correlation_id = Some(correlation_from(&headers));
    }

    let case_id = request.case_id.clone();
    let outcome =
        run_engine(&state, &case_id, move |engine, _| engine.start(request)).await;
    match outcome {
        Ok(outcome) if outcome.created => {
            state.track(&case_id);
            schedule_advance(&state, case_id.clone());
            state.metrics.record("workflow.start", RequestOutcome::Ok, elapsed_ms(started));
            (StatusCode::ACCEPTED, Json(start_body(&case_id))).into_response()
        }
        Ok(_) => {
            state.metrics.record("workflow.start", RequestOutcome::Rejected, elapsed_ms(started));
            (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "case already exists",
                    "workflow_id": case_id,
                })),
            )
                .into_response()
        }
        Err(error) => {
            state.metrics.record("workflow.start", RequestOutcome::Failed, elapsed_ms(started));
            engine_error_response(&error)
        }
    }
}

/// `GET /workflow/{id}/status`.
async fn workflow_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let case_id = CaseId::new(id);
    let outcome = run_engine(&state, &case_id, |engine, case_id| engine.query(case_id)).await;
    match outcome {
        Ok(view) => {
            state.metrics.record("workflow.status", RequestOutcome::Ok, elapsed_ms(started));
            Json(view).into_response()
        }
        Err(error) => {
            state.metrics.record("workflow.status", RequestOutcome::Rejected, elapsed_ms(started));
            engine_error_response(&error)
        }
    }
}

/// `POST /workflow/{id}/signal/{name}`.
async fn deliver_signal(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> Response {
    let started = Instant::now();
    let case_id = CaseId::new(id);

    let signal = match parse_signal(&name, payload) {
        Ok(signal) => signal,
        Err(detail) => {
            state.metrics.record("workflow.signal", RequestOutcome::Rejected, elapsed_ms(started));
            return error_body(StatusCode::BAD_REQUEST, &detail);
        }
    };

    let outcome =
        run_engine(&state, &case_id, move |engine, case_id| engine.signal(case_id, signal)).await;
    match outcome {
        Ok(outcome) if outcome.accepted => {
            schedule_advance(&state, case_id);
            state.metrics.record("workflow.signal", RequestOutcome::Ok, elapsed_ms(started));
            (StatusCode::ACCEPTED, Json(json!({ "delivered": true }))).into_response()
        }
        Ok(outcome) => {
            // Out-of-state: the payload was recorded in the event log.
            state.metrics.record("workflow.signal", RequestOutcome::Rejected, elapsed_ms(started));
            (
                StatusCode::CONFLICT,
                Json(json!({
                    "delivered": false,
                    "status": outcome.view.status,
                })),
            )
                .into_response()
        }
        Err(error) => {
            state.metrics.record("workflow.signal", RequestOutcome::Failed, elapsed_ms(started));
            engine_error_response(&error)
        }
    }
}

/// `POST /workflow/{id}/terminate` and `POST /workflow/{id}/cancel`.
async fn terminate_with_reason(
    state: &Arc<AppState>,
    id: String,
    payload: Option<Value>,
    graceful: bool,
) -> Response {
    let started = Instant::now();
    let case_id = CaseId::new(id);
    let reason = payload
        .as_ref()
        .and_then(|body| body.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or(if graceful { "cancelled" } else { "terminated" })
        .to_string();

    let outcome =
        run_engine(state, &case_id, move |engine, case_id| engine.terminate(case_id, &reason))
            .await;
    match outcome {
        Ok(view) => {
            state.forget_if_terminal(&case_id, view.status);
            state.metrics.record("workflow.terminate", RequestOutcome::Ok, elapsed_ms(started));
            Json(json!({ "status": if graceful { "cancelled" } else { "terminated" } }))
                .into_response()
        }
        Err(error) => {
            state.metrics.record("workflow.terminate", RequestOutcome::Failed, elapsed_ms(started));
            engine_error_response(&error)
        }
    }
}

/// `POST /workflow/{id}/terminate`.
async fn terminate_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<Value>>,
) -> Response {
    terminate_with_reason(&state, id, payload.map(|Json(value)| value), false).await
}

/// `POST /workflow/{id}/cancel`.
async fn cancel_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<Value>>,
) -> Response {
    terminate_with_reason(&state, id, payload.map(|Json(value)| value), true).await
}

/// `GET /workflow/{id}/query/{name}`.
async fn query_workflow(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
) -> Response {
    let case_id = CaseId::new(id);
    if name != "state" {
        return error_body(StatusCode::NOT_FOUND, &format!("unknown query {name}"));
    }
    let outcome = run_engine(&state, &case_id, |engine, case_id| engine.query(case_id)).await;
    match outcome {
        Ok(view) => Json(view).into_response(),
        Err(error) => engine_error_response(&error),
    }
}

/// `GET /health` and `GET /live`.
async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

/// `GET /ready`: requires a live engine backend.
async fn ready(State(state): State<Arc<AppState>>) -> Response {
    let probe = CaseId::new("__readiness_probe__");
    let outcome = run_engine(&state, &probe, |engine, case_id| engine.query(case_id)).await;
    match outcome {
        // The probe case never exists; an unknown-case answer proves the
        // store responded.
        Err(error) if error.code == ErrorCode::InvalidRequest => {
            Json(json!({ "status": "ready" })).into_response()
        }
        Ok(_) => Json(json!({ "status": "ready" })).into_response(),
        Err(_) => error_body(StatusCode::SERVICE_UNAVAILABLE, "engine backend unavailable"),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the accepted-start response body.
fn start_body(case_id: &CaseId) -> Value {
    json!({
        "workflow_id": case_id,
        "status_url": format!("/workflow/{case_id}/status"),
        "signal_url_template": format!("/workflow/{case_id}/signal/{{name}}"),
        "terminate_url": format!("/workflow/{case_id}/terminate"),
    })
}

/// Parses a named signal payload into the engine's signal type.
fn parse_signal(name: &str, payload: Value) -> Result<Signal, String> {
    let mut tagged = match payload {
        Value::Object(map) => Value::Object(map),
        Value::Null => Value::Object(serde_json::Map::new()),
        _ => return Err("signal payload must be a JSON object".to_string()),
    };
    if let Value::Object(map) = &mut tagged {
        map.insert("name".to_string(), Value::String(name.to_string()));
    }
    serde_json::from_value(tagged).map_err(|err| format!("invalid signal payload: {err}"))
}

/// Extracts or generates the request correlation id.
fn correlation_from(headers: &HeaderMap) -> CorrelationId {
    headers
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map_or_else(
            || CorrelationId::new(format!("corr-{:016x}", rand::thread_rng().r#gen::<u64>())),
            CorrelationId::new,
        )
}

/// Maps an engine error onto the HTTP surface.
fn engine_error_response(error: &EngineError) -> Response {
    let status = match error.code {
        ErrorCode::InvalidRequest if error.message.starts_with("unknown case") => {
            StatusCode::NOT_FOUND
        }
        ErrorCode::InvalidRequest | ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::StorageUnavailable
        | ErrorCode::CatalogUnavailable
        | ErrorCode::CatalogRateLimited
        | ErrorCode::ProviderTimeout => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::TenantForbidden => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, &error.message)
}

/// Builds a JSON error response.
fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Milliseconds elapsed since `started`.
fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
