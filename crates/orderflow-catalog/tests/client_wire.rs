// crates/orderflow-catalog/tests/client_wire.rs
// ============================================================================
// Module: Catalog Client Wire Tests
// Description: Token flow, classification, and draft creation over HTTP.
// Purpose: Validate the client against a scripted local server.
// Dependencies: orderflow-catalog, tiny_http
// ============================================================================
//! ## Overview
//! A scripted `tiny_http` server plays both the accounts endpoint and the
//! API: the client refreshes a token once, caches it, attaches it to data
//! requests, classifies 4xx/5xx per the taxonomy, and parses draft receipts.

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

use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use orderflow_catalog::CatalogClientConfig;
use orderflow_catalog::HttpCatalogClient;
use orderflow_catalog::OAuthCredentials;
use orderflow_catalog::StaticSecretSource;
use orderflow_catalog::TenantRateLimiter;
use orderflow_core::CaseId;
use orderflow_core::CatalogClient;
use orderflow_core::CustomerId;
use orderflow_core::DraftLine;
use orderflow_core::DraftPayload;
use orderflow_core::ErrorCode;
use orderflow_core::ItemId;
use orderflow_core::ItemQuery;
use orderflow_core::Money;
use orderflow_core::Sha256Digest;
use orderflow_core::TenantId;

/// One scripted response.
struct Scripted {
    /// HTTP status to answer with.
    status: u16,
    /// Response body.
    body: String,
    /// Optional extra header, as (name, value).
    header: Option<(&'static str, &'static str)>,
}

/// Observed request line plus its authorization header.
#[derive(Debug, Clone)]
struct Observed {
    /// Request path with query.
    path: String,
    /// Authorization header value, when present.
    authorization: Option<String>,
}

/// Serves the scripted responses in order, recording requests.
fn scripted_server(responses: Vec<Scripted>) -> (String, Arc<Mutex<Vec<Observed>>>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_string();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&observed);
    thread::spawn(move || {
        for scripted in responses {
            let Ok(request) = server.recv() else {
                return;
            };
            let authorization = request
                .headers()
                .iter()
                .find(|header| header.field.equiv("Authorization"))
                .map(|header| header.value.as_str().to_string());
            record.lock().unwrap().push(Observed {
                path: request.url().to_string(),
                authorization,
            });
            let mut response = tiny_http::Response::from_string(scripted.body.clone())
                .with_status_code(tiny_http::StatusCode(scripted.status));
            if let Some((name, value)) = scripted.header {
                response =
                    response.with_header(tiny_http::Header::from_bytes(name, value).unwrap());
            }
            let _unused = request.respond(response);
        }
    });
    (format!("http://{addr}"), observed)
}

/// Standard token response body.
fn token_body() -> String {
    "{\"access_token\":\"test-token\",\"expires_in\":3600}".to_string()
}

/// Builds a client pointed at the scripted server.
fn client_for(base: &str) -> HttpCatalogClient {
    let config = CatalogClientConfig {
        base_url: format!("{base}/inventory/v1"),
        token_url: format!("{base}/oauth/v2/token"),
        org_id: "org-1".to_string(),
        gtin_field_id: "cf_gtin".to_string(),
        idempotency_field_id: "cf_fingerprint".to_string(),
        timeout: Duration::from_secs(5),
        max_response_bytes: 1024 * 1024,
    };
    let secrets = StaticSecretSource::new(OAuthCredentials {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        refresh_token: "refresh".to_string(),
    });
    HttpCatalogClient::new(config, Box::new(secrets), 600).unwrap()
}

/// Verifies the token is fetched once and attached to data requests.
#[test]
fn token_is_refreshed_once_and_cached() {
    let (base, observed) = scripted_server(vec![
        Scripted {
            status: 200,
            body: token_body(),
            header: None,
        },
        Scripted {
            status: 200,
            body: "{\"contacts\":[{\"contact_id\":\"c-1\",\"contact_name\":\"ACME Ltd\"}]}"
                .to_string(),
            header: None,
        },
        Scripted {
            status: 200,
            body: "{\"contacts\":[]}".to_string(),
            header: None,
        },
    ]);
    let client = client_for(&base);
    let tenant = TenantId::new("t");

    let first = client.search_customer("ACME", &tenant).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, CustomerId::new("c-1"));

    let second = client.search_customer("Nobody", &tenant).unwrap();
    assert!(second.is_empty());

    let observed = observed.lock().unwrap();
    // One token request, two data requests.
    assert_eq!(observed.len(), 3);
    assert!(observed[0].path.starts_with("/oauth/v2/token"));
    assert!(observed[1].authorization.as_deref().unwrap().contains("test-token"));
    assert!(observed[1].path.contains("organization_id=org-1"));
}

/// Verifies a 429 maps to rate-limited with the Retry-After floor.
#[test]
fn rate_limit_carries_retry_after() {
    let (base, _) = scripted_server(vec![
        Scripted {
            status: 200,
            body: token_body(),
            header: None,
        },
        Scripted {
            status: 429,
            body: String::new(),
            header: Some(("Retry-After", "7")),
        },
    ]);
    let client = client_for(&base);
    let error = client.search_customer("ACME", &TenantId::new("t")).unwrap_err();
    assert_eq!(error.code, ErrorCode::CatalogRateLimited);
    assert_eq!(error.retry_after_ms, Some(7_000));
}

/// Verifies 5xx classifies as transient unavailability.
#[test]
fn server_error_is_transient() {
    let (base, _) = scripted_server(vec![
        Scripted {
            status: 200,
            body: token_body(),
            header: None,
        },
        Scripted {
            status: 503,
            body: String::new(),
            header: None,
        },
    ]);
    let client = client_for(&base);
    let error = client.search_customer("ACME", &TenantId::new("t")).unwrap_err();
    assert_eq!(error.code, ErrorCode::CatalogUnavailable);
}

/// Verifies plain 4xx classifies as non-retryable invalid input.
#[test]
fn client_error_is_not_retryable() {
    let (base, _) = scripted_server(vec![
        Scripted {
            status: 200,
            body: token_body(),
            header: None,
        },
        Scripted {
            status: 400,
            body: String::new(),
            header: None,
        },
    ]);
    let client = client_for(&base);
    let error = client.search_customer("ACME", &TenantId::new("t")).unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidRequest);
}

/// Verifies a rejected token refresh surfaces as an auth failure.
#[test]
fn rejected_refresh_is_auth_failure() {
    let (base, _) = scripted_server(vec![Scripted {
        status: 400,
        body: String::new(),
        header: None,
    }]);
    let client = client_for(&base);
    let error = client.search_customer("ACME", &TenantId::new("t")).unwrap_err();
    assert_eq!(error.code, ErrorCode::CatalogAuthFailed);
}

/// Verifies item search parses the GTIN custom field and the price.
#[test]
fn item_search_parses_gtin_and_price() {
    let (base, _) = scripted_server(vec![
        Scripted {
            status: 200,
            body: token_body(),
            header: None,
        },
        Scripted {
            status: 200,
            body: "{\"items\":[{\"item_id\":\"i-1\",\"sku\":\"SKU-001\",\"name\":\"Widget\",\
                   \"rate\":42.0,\"custom_fields\":[{\"customfield_id\":\"cf_gtin\",\
                   \"value\":\"04012345678901\"}]}]}"
                .to_string(),
            header: None,
        },
    ]);
    let client = client_for(&base);
    let items =
        client.search_item(&ItemQuery::Sku("SKU-001".to_string()), &TenantId::new("t")).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, ItemId::new("i-1"));
    assert_eq!(items[0].gtin.as_deref(), Some("04012345678901"));
    assert_eq!(items[0].unit_price, Money::from_minor(4_200));
}

/// Verifies draft creation parses the receipt and sends the fingerprint.
#[test]
fn create_draft_parses_receipt() {
    let (base, observed) = scripted_server(vec![
        Scripted {
            status: 200,
            body: token_body(),
            header: None,
        },
        Scripted {
            status: 201,
            body: "{\"salesorder\":{\"salesorder_id\":\"so-1\",\
                   \"salesorder_number\":\"SO-0001\"}}"
                .to_string(),
            header: None,
        },
    ]);
    let client = client_for(&base);
    let payload = DraftPayload {
        tenant_id: TenantId::new("t"),
        customer_id: CustomerId::new("c-1"),
        lines: vec![DraftLine {
            item_id: ItemId::new("i-1"),
            quantity: 2.0,
            unit_price: Money::from_minor(4_200),
        }],
        case_id: CaseId::new("C1"),
    };
    let token = Sha256Digest::of_bytes(b"fingerprint");
    let receipt = client.create_draft(&payload, &token).unwrap();
    assert_eq!(receipt.draft_id.as_str(), "so-1");
    assert_eq!(receipt.draft_number, "SO-0001");
    assert!(!receipt.is_duplicate);

    let observed = observed.lock().unwrap();
    assert!(observed[1].path.starts_with("/inventory/v1/salesorders"));
}

/// Verifies the per-tenant token bucket floors retries when exhausted.
#[test]
fn tenant_bucket_exhaustion_carries_delay() {
    let limiter = TenantRateLimiter::new(60);
    let tenant = TenantId::new("t");
    for _ in 0..60 {
        limiter.acquire(&tenant).unwrap();
    }
    let error = limiter.acquire(&tenant).unwrap_err();
    assert_eq!(error.code, ErrorCode::CatalogRateLimited);
    assert!(error.retry_after_ms.unwrap_or(0) > 0);
}
