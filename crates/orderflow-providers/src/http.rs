// crates/orderflow-providers/src/http.rs
// ============================================================================
// Module: HTTP Model Provider
// Description: Committee provider fronting a remote model endpoint.
// Purpose: Issue bounded prompt requests with strict transport limits.
// Dependencies: orderflow-core, reqwest, serde_json, url
// ============================================================================

//! ## Overview
//! The HTTP provider posts the prompt as JSON and returns the response body
//! verbatim; validation happens in the committee runtime. Transport is
//! deliberately strict: HTTPS unless explicitly relaxed, no redirects, a hard
//! response size cap, and the per-call time budget enforced as the request
//! timeout. Responses never short-circuit validation here, so a misbehaving
//! endpoint degrades to an unusable committee vote rather than an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use orderflow_core::ModelProvider;
use orderflow_core::ProviderError;
use orderflow_core::ProviderFamily;
use orderflow_core::ProviderId;
use serde::Deserialize;
use serde_json::json;
use url::Url;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the HTTP model provider.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` endpoints.
/// - `max_response_bytes` is a hard upper bound on response bodies.
/// - The committee's per-call time budget is applied as the request timeout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpProviderConfig {
    /// Allow cleartext HTTP (disabled by default; tests only).
    pub allow_http: bool,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            allow_http: false,
            max_response_bytes: 1024 * 1024,
            user_agent: "orderflow/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Committee provider backed by a remote model endpoint.
pub struct HttpModelProvider {
    /// Provider identifier.
    id: ProviderId,
    /// Provider family tag.
    family: ProviderFamily,
    /// Endpoint accepting prompt POSTs.
    endpoint: Url,
    /// Transport configuration.
    config: HttpProviderConfig,
}

impl HttpModelProvider {
    /// Creates a provider for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the endpoint is not a valid
    /// URL, embeds credentials, or uses a scheme the config forbids.
    pub fn new(
        id: ProviderId,
        family: ProviderFamily,
        endpoint: &str,
        config: HttpProviderConfig,
    ) -> Result<Self, ProviderError> {
        let url = Url::parse(endpoint)
            .map_err(|err| ProviderError::Transport(format!("invalid endpoint: {err}")))?;
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ProviderError::Transport(
                "endpoint must not embed credentials".to_string(),
            ));
        }
        match url.scheme() {
            "https" => {}
            "http" if config.allow_http => {}
            other => {
                return Err(ProviderError::Transport(format!("scheme {other} is not allowed")));
            }
        }
        Ok(Self {
            id,
            family,
            endpoint: url,
            config,
        })
    }

    /// Builds a blocking client bounded by the call's time budget.
    fn client(&self, time_budget_ms: u64) -> Result<reqwest::blocking::Client, ProviderError> {
        reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(time_budget_ms))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|err| ProviderError::Transport(err.to_string()))
    }
}

impl ModelProvider for HttpModelProvider {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    fn family(&self) -> ProviderFamily {
        self.family.clone()
    }

    fn invoke(&self, prompt: &str, time_budget_ms: u64) -> Result<String, ProviderError> {
        let client = self.client(time_budget_ms)?;
        let response = client
            .post(self.endpoint.clone())
            .json(&json!({ "prompt": prompt }))
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    ProviderError::Timeout(time_budget_ms)
                } else {
                    ProviderError::Transport(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Transport(format!(
                "endpoint returned status {}",
                response.status()
            )));
        }

        let mut body = String::new();
        let mut limited =
            response.take(u64::try_from(self.config.max_response_bytes).unwrap_or(u64::MAX) + 1);
        limited
            .read_to_string(&mut body)
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        if body.len() > self.config.max_response_bytes {
            return Err(ProviderError::Transport(format!(
                "response exceeded {} bytes",
                self.config.max_response_bytes
            )));
        }
        Ok(body)
    }
}
