// crates/orderflow-catalog/src/lib.rs
// ============================================================================
// Module: Orderflow Catalog Library
// Description: Narrow client for the external order-management system.
// Purpose: Expose exactly the five operations the workflow core invokes.
// Dependencies: crate::{auth, client, limits}
// ============================================================================

//! ## Overview
//! The catalog client wraps the external order-management HTTP API behind
//! the core [`orderflow_core::CatalogClient`] interface: customer and item
//! search, idempotent draft creation, and idempotency-token recovery. Token
//! refresh is single-flight with an expiry safety buffer; per-tenant token
//! buckets bound the request rate; every failure is classified before it
//! reaches the engine.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod client;
pub mod limits;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::OAuthCredentials;
pub use auth::SecretSource;
pub use auth::StaticSecretSource;
pub use auth::TokenCache;
pub use client::CatalogClientConfig;
pub use client::HttpCatalogClient;
pub use limits::TenantRateLimiter;
