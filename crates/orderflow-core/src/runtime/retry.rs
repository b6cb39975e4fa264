// crates/orderflow-core/src/runtime/retry.rs
// ============================================================================
// Module: Orderflow Retry Executor
// Description: Bounded, kind-aware retry with jittered exponential backoff.
// Purpose: Retry transient activity failures without retrying bad input.
// Dependencies: crate::{core::error, interfaces}, rand
// ============================================================================

//! ## Overview
//! Activities classify their errors before returning; the executor consults
//! only the [`crate::core::ErrorKind`]. Transient errors retry under the
//! policy; everything else propagates immediately. A server-supplied
//! `Retry-After` floors the computed backoff delay regardless of the
//! schedule. Jitter is applied inside the activity layer, so workflow replay
//! never observes it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::interfaces::Sleeper;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial: Duration,
    /// Backoff multiplier between attempts.
    pub coefficient: u32,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl RetryPolicy {
    /// Standard policy: 3 attempts, 5 s start, doubling, 30 s cap.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            max_attempts: 3,
            initial: Duration::from_secs(5),
            coefficient: 2,
            cap: Duration::from_secs(30),
        }
    }

    /// Aggressive policy: 5 attempts, 5 s start, doubling, 60 s cap.
    ///
    /// Used for external-catalog draft creation and token refresh.
    #[must_use]
    pub const fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial: Duration::from_secs(5),
            coefficient: 2,
            cap: Duration::from_secs(60),
        }
    }

    /// Computes the capped backoff delay before attempt `next_attempt`
    /// (1-based; the delay precedes attempt 2 and later).
    #[must_use]
    pub fn delay_before(&self, next_attempt: u32) -> Duration {
        let exponent = next_attempt.saturating_sub(2);
        let factor = u64::from(self.coefficient).saturating_pow(exponent);
        let raw = self.initial.saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX));
        raw.min(self.cap)
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Runs an operation under the policy, sleeping between attempts.
///
/// The closure receives the 1-based attempt number so activities can make
/// their arguments deterministic across retries. Only
/// [`ErrorKind::Transient`] failures are retried; any `retry_after_ms` on the
/// error floors the next delay. Up to 10% random jitter is added on top of
/// the computed delay to decorrelate workers.
///
/// # Errors
///
/// Returns the last classified error once attempts are exhausted, or the
/// first non-transient error immediately.
pub fn run_with_retry<T>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: impl FnMut(u32) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(error) => {
                let exhausted = attempt >= policy.max_attempts;
                if error.kind() != ErrorKind::Transient || exhausted {
                    return Err(error);
                }
                let next = attempt + 1;
                let mut delay = policy.delay_before(next);
                if let Some(floor_ms) = error.retry_after_ms {
                    delay = delay.max(Duration::from_millis(floor_ms));
                }
                sleeper.sleep(jittered(delay));
                attempt = next;
            }
        }
    }
}

/// Adds up to 10% random jitter to a delay.
fn jittered(delay: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..=0.1);
    delay.mul_f64(1.0 + jitter)
}
