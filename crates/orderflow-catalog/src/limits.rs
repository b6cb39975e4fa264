// crates/orderflow-catalog/src/limits.rs
// ============================================================================
// Module: Tenant Rate Limits
// Description: Per-tenant token bucket for outbound catalog calls.
// Purpose: Bound the request rate before the catalog has to throttle us.
// Dependencies: orderflow-core
// ============================================================================

//! ## Overview
//! Each tenant gets a token bucket refilled continuously at the configured
//! per-minute rate. An exhausted bucket yields a classified rate-limit error
//! carrying the refill delay, so the engine's aggressive retry policy sleeps
//! exactly long enough instead of hammering the API.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Instant;

use orderflow_core::EngineError;
use orderflow_core::ErrorCode;
use orderflow_core::TenantId;

// ============================================================================
// SECTION: Token Bucket
// ============================================================================

/// One tenant's bucket state.
struct Bucket {
    /// Tokens currently available.
    tokens: f64,
    /// Last refill instant.
    refilled_at: Instant,
}

/// Per-tenant token-bucket limiter.
pub struct TenantRateLimiter {
    /// Requests allowed per minute per tenant.
    per_minute: u32,
    /// Bucket state per tenant.
    buckets: Mutex<HashMap<TenantId, Bucket>>,
}

impl TenantRateLimiter {
    /// Creates a limiter with the given per-minute budget.
    #[must_use]
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Takes one token for the tenant or fails with the refill delay.
    ///
    /// # Errors
    ///
    /// Returns `CATALOG_RATE_LIMITED` with `retry_after_ms` set to the time
    /// until the next token becomes available.
    pub fn acquire(&self, tenant: &TenantId) -> Result<(), EngineError> {
        let capacity = f64::from(self.per_minute.max(1));
        let per_second = capacity / 60.0;
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(tenant.clone()).or_insert_with(|| Bucket {
            tokens: capacity,
            refilled_at: Instant::now(),
        });

        let elapsed = bucket.refilled_at.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * per_second).min(capacity);
        bucket.refilled_at = Instant::now();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let deficit = 1.0 - bucket.tokens;
        let wait_ms = (deficit / per_second * 1_000.0).ceil();
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "Wait is bounded by one refill period; the ceil of a small positive float."
        )]
        let wait_ms = wait_ms as u64;
        Err(EngineError::new(
            ErrorCode::CatalogRateLimited,
            format!("tenant {tenant} exhausted its request budget"),
        )
        .with_retry_after(wait_ms))
    }
}
