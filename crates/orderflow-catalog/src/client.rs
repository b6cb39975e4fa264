// crates/orderflow-catalog/src/client.rs
// ============================================================================
// Module: Catalog HTTP Client
// Description: The five catalog operations over the order-management API.
// Purpose: Deterministic, classified access to customers, items, and drafts.
// Dependencies: orderflow-config, orderflow-core, reqwest, serde_json, url
// ============================================================================

//! ## Overview
//! The client exposes exactly what the engine needs: customer search and
//! fetch, item search by SKU/GTIN/name, idempotent draft creation, and
//! recovery of a draft by its idempotency token. The fingerprint rides in a
//! dedicated custom field on the draft, so a creation response lost on the
//! wire is recoverable by scanning that field. Failures are classified
//! before they return: 429 carries the `Retry-After` floor, 5xx and 408 are
//! transient, 401/403 surface to operators, and remaining 4xx fail the
//! request outright.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use orderflow_config::CatalogRegion;
use orderflow_core::CatalogClient;
use orderflow_core::CatalogError;
use orderflow_core::CustomerCandidate;
use orderflow_core::CustomerId;
use orderflow_core::DraftPayload;
use orderflow_core::DraftReceipt;
use orderflow_core::DraftRecord;
use orderflow_core::EngineError;
use orderflow_core::ErrorCode;
use orderflow_core::ItemCandidate;
use orderflow_core::ItemId;
use orderflow_core::ItemQuery;
use orderflow_core::Money;
use orderflow_core::Sha256Digest;
use orderflow_core::TenantId;
use serde_json::Value;
use serde_json::json;
use url::Url;

use crate::auth::SecretSource;
use crate::auth::TokenCache;
use crate::limits::TenantRateLimiter;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Catalog client configuration.
#[derive(Clone)]
pub struct CatalogClientConfig {
    /// API base URL, e.g. `https://www.zohoapis.eu/inventory/v1`.
    pub base_url: String,
    /// OAuth token endpoint.
    pub token_url: String,
    /// Organisation identifier appended to every request.
    pub org_id: String,
    /// Custom-field id carrying item GTINs.
    pub gtin_field_id: String,
    /// Custom-field id carrying the idempotency fingerprint on drafts.
    pub idempotency_field_id: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum accepted response size in bytes.
    pub max_response_bytes: usize,
}

impl CatalogClientConfig {
    /// Builds a config for a data-center region.
    #[must_use]
    pub fn for_region(
        region: CatalogRegion,
        org_id: impl Into<String>,
        gtin_field_id: impl Into<String>,
        idempotency_field_id: impl Into<String>,
    ) -> Self {
        let (api, accounts) = region_hosts(region);
        Self {
            base_url: format!("{api}/inventory/v1"),
            token_url: format!("{accounts}/oauth/v2/token"),
            org_id: org_id.into(),
            gtin_field_id: gtin_field_id.into(),
            idempotency_field_id: idempotency_field_id.into(),
            timeout: Duration::from_secs(30),
            max_response_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Returns the API and accounts hosts for a region.
const fn region_hosts(region: CatalogRegion) -> (&'static str, &'static str) {
    match region {
        CatalogRegion::Eu => ("https://www.zohoapis.eu", "https://accounts.zoho.eu"),
        CatalogRegion::Com => ("https://www.zohoapis.com", "https://accounts.zoho.com"),
        CatalogRegion::In => ("https://www.zohoapis.in", "https://accounts.zoho.in"),
        CatalogRegion::Au => ("https://www.zohoapis.com.au", "https://accounts.zoho.com.au"),
        CatalogRegion::Jp => ("https://www.zohoapis.jp", "https://accounts.zoho.jp"),
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Catalog client over the order-management HTTP API.
pub struct HttpCatalogClient {
    /// Shared blocking HTTP client.
    http: reqwest::blocking::Client,
    /// Client configuration.
    config: CatalogClientConfig,
    /// Access-token cache.
    tokens: TokenCache,
    /// Per-tenant outbound rate limiter.
    limiter: TenantRateLimiter,
}

impl HttpCatalogClient {
    /// Creates a client over the given configuration and secret source.
    ///
    /// # Errors
    ///
    /// Returns a classified [`CatalogError`] when the HTTP client cannot be
    /// constructed.
    pub fn new(
        config: CatalogClientConfig,
        secrets: Box<dyn SecretSource>,
        requests_per_minute: u32,
    ) -> Result<Self, CatalogError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| EngineError::new(ErrorCode::CatalogUnavailable, err.to_string()))?;
        let tokens = TokenCache::new(config.token_url.clone(), secrets);
        Ok(Self {
            http,
            config,
            tokens,
            limiter: TenantRateLimiter::new(requests_per_minute),
        })
    }

    /// Builds a request URL under the API base.
    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, CatalogError> {
        let mut url = Url::parse(&format!("{}{path}", self.config.base_url))
            .map_err(|err| EngineError::new(ErrorCode::InvalidRequest, err.to_string()))?;
        url.query_pairs_mut().append_pair("organization_id", &self.config.org_id);
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    /// Sends a request with auth and rate limiting, returning parsed JSON.
    fn send_json(
        &self,
        tenant: Option<&TenantId>,
        build: impl FnOnce(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<Value, CatalogError> {
        if let Some(tenant) = tenant {
            self.limiter.acquire(tenant)?;
        }
        let bearer = self.tokens.bearer(&self.http)?;
        let response = build(&self.http)
            .header("Authorization", format!("Zoho-oauthtoken {bearer}"))
            .send()
            .map_err(|err| {
                EngineError::new(
                    ErrorCode::CatalogUnavailable,
                    if err.is_timeout() { "request timed out" } else { "request failed" },
                )
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1_000));

        if status.as_u16() == 401 {
            self.tokens.invalidate();
        }
        classify_status(status.as_u16(), retry_after)?;

        let bytes = response
            .bytes()
            .map_err(|err| EngineError::new(ErrorCode::CatalogUnavailable, err.to_string()))?;
        if bytes.len() > self.config.max_response_bytes {
            return Err(EngineError::new(
                ErrorCode::CatalogUnavailable,
                format!("response exceeded {} bytes", self.config.max_response_bytes),
            ));
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| EngineError::new(ErrorCode::CatalogUnavailable, format!("malformed response: {err}")))
    }

    /// Parses an item object from a catalog response.
    fn parse_item(&self, value: &Value) -> Option<ItemCandidate> {
        let id = value.get("item_id")?.as_str()?;
        let sku = value.get("sku")?.as_str()?;
        let name = value.get("name")?.as_str()?;
        let rate = value.get("rate")?.as_f64()?;
        let gtin = value
            .get("custom_fields")
            .and_then(Value::as_array)
            .and_then(|fields| {
                fields.iter().find(|field| {
                    field.get("customfield_id").and_then(Value::as_str)
                        == Some(self.config.gtin_field_id.as_str())
                })
            })
            .and_then(|field| field.get("value"))
            .and_then(Value::as_str)
            .map(ToString::to_string);
        Some(ItemCandidate {
            id: ItemId::new(id),
            sku: sku.to_string(),
            gtin,
            name: name.to_string(),
            unit_price: money_from_rate(rate),
        })
    }
}

impl CatalogClient for HttpCatalogClient {
    fn search_customer(
        &self,
        name: &str,
        tenant: &TenantId,
    ) -> Result<Vec<CustomerCandidate>, CatalogError> {
        let url = self.url("/contacts", &[("contact_name_contains", name)])?;
        let body = self.send_json(Some(tenant), move |http| http.get(url))?;
        let contacts = body
            .get("contacts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(contacts
            .iter()
            .filter_map(|contact| {
                Some(CustomerCandidate {
                    id: CustomerId::new(contact.get("contact_id")?.as_str()?),
                    display_name: contact.get("contact_name")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    fn get_customer(&self, id: &CustomerId) -> Result<CustomerCandidate, CatalogError> {
        let url = self.url(&format!("/contacts/{id}"), &[])?;
        let body = self.send_json(None, move |http| http.get(url))?;
        let contact = body.get("contact").ok_or_else(|| {
            EngineError::new(ErrorCode::CatalogUnavailable, "contact payload missing")
        })?;
        let display_name = contact
            .get("contact_name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::new(ErrorCode::CatalogUnavailable, "contact name missing")
            })?;
        Ok(CustomerCandidate {
            id: id.clone(),
            display_name: display_name.to_string(),
        })
    }

    fn search_item(
        &self,
        query: &ItemQuery,
        tenant: &TenantId,
    ) -> Result<Vec<ItemCandidate>, CatalogError> {
        let url = match query {
            ItemQuery::Sku(sku) => self.url("/items", &[("sku", sku.as_str())])?,
            ItemQuery::Gtin(gtin) => self.url(
                "/items",
                &[
                    ("custom_field_id", self.config.gtin_field_id.as_str()),
                    ("custom_field_value", gtin.as_str()),
                ],
            )?,
            ItemQuery::Name(name) => self.url("/items", &[("name_contains", name.as_str())])?,
        };
        let body = self.send_json(Some(tenant), move |http| http.get(url))?;
        let items = body.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(items.iter().filter_map(|item| self.parse_item(item)).collect())
    }

    fn create_draft(
        &self,
        payload: &DraftPayload,
        idempotency_token: &Sha256Digest,
    ) -> Result<DraftReceipt, CatalogError> {
        let body = json!({
            "customer_id": payload.customer_id,
            "reference_number": payload.case_id,
            "is_draft": true,
            "line_items": payload
                .lines
                .iter()
                .map(|line| {
                    json!({
                        "item_id": line.item_id,
                        "quantity": line.quantity,
                        "rate": rate_from_money(line.unit_price),
                    })
                })
                .collect::<Vec<_>>(),
            "custom_fields": [{
                "customfield_id": self.config.idempotency_field_id,
                "value": idempotency_token,
            }],
        });

        let url = self.url("/salesorders", &[])?;
        let tenant = payload.tenant_id.clone();
        let result = self.send_json(Some(&tenant), move |http| http.post(url).json(&body));

        match result {
            Ok(response) => {
                let order = response.get("salesorder").ok_or_else(|| {
                    EngineError::new(ErrorCode::CatalogUnavailable, "salesorder payload missing")
                })?;
                let draft_id = order
                    .get("salesorder_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        EngineError::new(ErrorCode::CatalogUnavailable, "salesorder id missing")
                    })?;
                let draft_number = order
                    .get("salesorder_number")
                    .and_then(Value::as_str)
                    .unwrap_or(draft_id);
                let is_duplicate =
                    response.get("duplicate").and_then(Value::as_bool).unwrap_or(false);
                Ok(DraftReceipt {
                    draft_id: orderflow_core::DraftId::new(draft_id),
                    draft_number: draft_number.to_string(),
                    is_duplicate,
                })
            }
            // A conflict means the idempotency token already owns a draft;
            // recover its id through the token scan.
            Err(error) if error.code == ErrorCode::InvalidRequest && error.message.contains("409") => {
                let existing = self.find_draft_by_idempotency_token(idempotency_token)?;
                existing.map_or_else(
                    || Err(error),
                    |record| {
                        Ok(DraftReceipt {
                            draft_id: record.draft_id,
                            draft_number: record.draft_number,
                            is_duplicate: true,
                        })
                    },
                )
            }
            Err(error) => Err(error),
        }
    }

    fn find_draft_by_idempotency_token(
        &self,
        token: &Sha256Digest,
    ) -> Result<Option<DraftRecord>, CatalogError> {
        let url = self.url(
            "/salesorders",
            &[
                ("custom_field_id", self.config.idempotency_field_id.as_str()),
                ("custom_field_value", token.as_str()),
            ],
        )?;
        let body = self.send_json(None, move |http| http.get(url))?;
        let orders = body
            .get("salesorders")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(orders.first().and_then(|order| {
            let draft_id = order.get("salesorder_id")?.as_str()?;
            let draft_number =
                order.get("salesorder_number").and_then(Value::as_str).unwrap_or(draft_id);
            Some(DraftRecord {
                draft_id: orderflow_core::DraftId::new(draft_id),
                draft_number: draft_number.to_string(),
            })
        }))
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Maps an HTTP status onto the error taxonomy.
///
/// # Errors
///
/// Returns the classified error for every non-success status.
fn classify_status(status: u16, retry_after_ms: Option<u64>) -> Result<(), CatalogError> {
    match status {
        200..=299 => Ok(()),
        401 => Err(EngineError::new(ErrorCode::CatalogAuthFailed, "status 401")),
        403 => Err(EngineError::new(ErrorCode::TenantForbidden, "status 403")),
        429 => {
            let mut error = EngineError::new(ErrorCode::CatalogRateLimited, "status 429");
            if let Some(floor) = retry_after_ms {
                error = error.with_retry_after(floor);
            }
            Err(error)
        }
        408 | 500..=599 => {
            let mut error = EngineError::new(ErrorCode::CatalogUnavailable, format!("status {status}"));
            if let Some(floor) = retry_after_ms {
                error = error.with_retry_after(floor);
            }
            Err(error)
        }
        other => Err(EngineError::new(ErrorCode::InvalidRequest, format!("status {other}"))),
    }
}

// ============================================================================
// SECTION: Money Conversion
// ============================================================================

/// Converts a catalog decimal rate to minor units.
fn money_from_rate(rate: f64) -> Money {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Catalog rates are bounded currency amounts; the round fits i64."
    )]
    let minor = (rate * 100.0).round() as i64;
    Money::from_minor(minor)
}

/// Converts minor units to the catalog's decimal rate.
#[allow(
    clippy::cast_precision_loss,
    reason = "Currency amounts are far below the f64 integer precision limit."
)]
fn rate_from_money(money: Money) -> f64 {
    money.minor() as f64 / 100.0
}
