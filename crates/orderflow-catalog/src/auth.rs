// crates/orderflow-catalog/src/auth.rs
// ============================================================================
// Module: Catalog Authentication
// Description: OAuth refresh-token flow with single-flight token caching.
// Purpose: Keep one fresh access token per process without credential leaks.
// Dependencies: orderflow-core, reqwest, serde
// ============================================================================

//! ## Overview
//! Access tokens cache in memory with their expiry minus a safety buffer; a
//! single refresh runs at a time and concurrent requests wait on it (the
//! refresh happens under the cache lock). Credentials come from a secret
//! source and are never logged, serialized, or written to disk; error
//! messages carry status codes only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use orderflow_core::EngineError;
use orderflow_core::ErrorCode;
use serde::Deserialize;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Safety buffer subtracted from the reported token lifetime.
const EXPIRY_SAFETY_BUFFER: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// OAuth client credentials plus the long-lived refresh token.
///
/// # Invariants
/// - Never derive `Debug`, `Serialize`, or `Display` for this type; the
///   secret must not be printable.
#[derive(Clone)]
pub struct OAuthCredentials {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
}

/// Source of catalog credentials (a secret store in production).
pub trait SecretSource: Send + Sync {
    /// Fetches the current credentials.
    ///
    /// # Errors
    ///
    /// Returns a classified [`EngineError`] when the secret store is
    /// unreachable.
    fn credentials(&self) -> Result<OAuthCredentials, EngineError>;
}

/// In-memory secret source filled by the composition root.
pub struct StaticSecretSource {
    /// Held credentials.
    credentials: OAuthCredentials,
}

impl StaticSecretSource {
    /// Wraps credentials already fetched by the composition root.
    #[must_use]
    pub const fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
        }
    }
}

impl SecretSource for StaticSecretSource {
    fn credentials(&self) -> Result<OAuthCredentials, EngineError> {
        Ok(self.credentials.clone())
    }
}

// ============================================================================
// SECTION: Token Cache
// ============================================================================

/// Token endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    /// Bearer access token.
    access_token: String,
    /// Lifetime in seconds.
    expires_in: u64,
}

/// Cached access token with its hard deadline.
struct CachedToken {
    /// Bearer token value.
    token: String,
    /// Instant after which the token is treated as expired.
    valid_until: Instant,
}

/// In-memory access-token cache with single-flight refresh.
pub struct TokenCache {
    /// Token endpoint URL.
    token_url: String,
    /// Credential source.
    secrets: Box<dyn SecretSource>,
    /// Cached token; the refresh runs while this lock is held, which is what
    /// serializes concurrent refreshes.
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Creates a cache for the given token endpoint.
    #[must_use]
    pub fn new(token_url: String, secrets: Box<dyn SecretSource>) -> Self {
        Self {
            token_url,
            secrets,
            cached: Mutex::new(None),
        }
    }

    /// Returns a fresh bearer token, refreshing at most once concurrently.
    ///
    /// # Errors
    ///
    /// Returns `CATALOG_AUTH_FAILED` when the refresh is rejected, or
    /// `CATALOG_UNAVAILABLE` when the token endpoint is unreachable.
    pub fn bearer(&self, client: &reqwest::blocking::Client) -> Result<String, EngineError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.valid_until
        {
            return Ok(token.token.clone());
        }

        let credentials = self.secrets.credentials()?;
        let response = client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", credentials.refresh_token.as_str()),
            ])
            .send()
            .map_err(|err| {
                EngineError::new(
                    ErrorCode::CatalogUnavailable,
                    format!("token endpoint unreachable: {}", transport_summary(&err)),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            // Never echo the response body: it may restate credentials.
            return Err(EngineError::new(
                ErrorCode::CatalogAuthFailed,
                format!("token refresh rejected with status {status}"),
            ));
        }
        let token: TokenResponse = response.json().map_err(|_| {
            EngineError::new(ErrorCode::CatalogAuthFailed, "token response malformed")
        })?;

        let lifetime = Duration::from_secs(token.expires_in)
            .saturating_sub(EXPIRY_SAFETY_BUFFER);
        let bearer = token.access_token.clone();
        *cached = Some(CachedToken {
            token: token.access_token,
            valid_until: Instant::now() + lifetime,
        });
        Ok(bearer)
    }

    /// Drops the cached token so the next call refreshes.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Builds the token-refresh request body for diagnostics tooling.
    ///
    /// Secrets are replaced by placeholders; this is the only rendering of
    /// the refresh request that may ever be logged.
    #[must_use]
    pub fn redacted_request_shape(&self) -> serde_json::Value {
        json!({
            "url": self.token_url,
            "grant_type": "refresh_token",
            "client_id": "[redacted]",
            "client_secret": "[redacted]",
            "refresh_token": "[redacted]",
        })
    }
}

/// Summarizes a transport error without its URL query (which could carry
/// tokens on some deployments).
fn transport_summary(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timeout".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        "request failed".to_string()
    }
}
