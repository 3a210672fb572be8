//! Deadline enforcement for breaker-guarded calls.
//!
//! # Responsibilities
//! - Bound how long a guarded call may run
//! - Count an overrun as a breaker failure
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - An overrun surfaces as `CircuitTimeout`, distinct from the call's own errors

use std::future::Future;
use std::time::Duration;
use tokio::time;

use crate::error::{Result, TunnelError};
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Run `f` through `breaker`, failing with `CircuitTimeout` after `limit`.
pub async fn execute_with_timeout<T, F, Fut>(
    breaker: &CircuitBreaker,
    limit: Duration,
    f: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !breaker.allow() {
        return Err(TunnelError::CircuitOpen);
    }

    match time::timeout(limit, f()).await {
        Ok(Ok(value)) => {
            breaker.record_success();
            Ok(value)
        }
        Ok(Err(e)) => {
            breaker.record_failure();
            Err(e)
        }
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "Guarded call timed out");
            breaker.record_failure();
            Err(TunnelError::CircuitTimeout)
        }
    }
}
