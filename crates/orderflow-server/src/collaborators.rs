// crates/orderflow-server/src/collaborators.rs
// ============================================================================
// Module: Server Collaborators
// Description: Composition-root implementations of external collaborators.
// Purpose: Wire the parser and notifier seams without embedding their logic.
// Dependencies: orderflow-core, reqwest, serde_json, tracing
// ============================================================================

//! ## Overview
//! The spreadsheet parser is an external service: it writes its output
//! contract (a serialized parse outcome) next to the upload, and
//! [`PassthroughParser`] decodes that contract. Notifications go to a chat
//! webhook when one is configured and to the structured log otherwise; a
//! delivery failure never fails the workflow.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use orderflow_core::Notification;
use orderflow_core::Notifier;
use orderflow_core::NotifyError;
use orderflow_core::OrderParser;
use orderflow_core::ParseOutcome;
use orderflow_core::ParserError;

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Parser seam decoding the upstream parser's output contract.
///
/// The parsing service stores a serialized [`ParseOutcome`] as the uploaded
/// blob; this collaborator validates and decodes it. Malformed contract
/// bytes are an infrastructure failure, not a blocked file.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughParser;

impl OrderParser for PassthroughParser {
    fn parse(&self, _filename: &str, bytes: &[u8]) -> Result<ParseOutcome, ParserError> {
        serde_json::from_slice(bytes)
            .map_err(|err| ParserError::Unavailable(format!("parser contract malformed: {err}")))
    }
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notifier posting adaptive-card-ready JSON to a chat webhook.
pub struct WebhookNotifier {
    /// Webhook URL; `None` logs notifications instead of posting them.
    webhook: Option<String>,
    /// Blocking HTTP client for webhook delivery.
    client: reqwest::blocking::Client,
}

impl WebhookNotifier {
    /// Creates a notifier for an optional webhook URL.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Delivery`] when the HTTP client cannot be
    /// constructed.
    pub fn new(webhook: Option<String>) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;
        Ok(Self {
            webhook,
            client,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match &self.webhook {
            Some(url) => {
                let response = self
                    .client
                    .post(url)
                    .json(notification)
                    .send()
                    .map_err(|err| NotifyError::Delivery(err.to_string()))?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(NotifyError::Delivery(format!(
                        "webhook returned status {}",
                        response.status()
                    )))
                }
            }
            None => {
                tracing::info!(
                    case_id = %notification.case_id,
                    kind = ?notification.kind,
                    reference = %notification.reference,
                    "notification: {}",
                    notification.message
                );
                Ok(())
            }
        }
    }
}
