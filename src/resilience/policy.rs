//! Breaker + retry cooperation for one logical call.
//!
//! Every attempt goes through the destination's breaker. A retryable
//! failure (an open circuit included) waits for the next backoff delay; a
//! non-retryable one ends the call unchanged. Cancellation always wins.

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::TunnelConfig;
use crate::error::Result;
use crate::resilience::destination::DestinationBreaker;
use crate::resilience::retries::{RetryConfig, Retryer};

#[derive(Debug, Clone)]
pub struct ResiliencePolicy {
    breakers: Arc<DestinationBreaker>,
    retry: RetryConfig,
}

impl ResiliencePolicy {
    pub fn new(breakers: Arc<DestinationBreaker>, retry: RetryConfig) -> Self {
        Self { breakers, retry }
    }

    pub fn from_config(config: &TunnelConfig) -> Self {
        Self::new(
            Arc::new(DestinationBreaker::new(config.circuit_breaker.to_breaker_config())),
            config.retry.to_retry_config(),
        )
    }

    pub fn breakers(&self) -> &Arc<DestinationBreaker> {
        &self.breakers
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Call `f` against `dest` until it succeeds or must give up.
    pub async fn call<T, F, Fut>(&self, cancel: &CancellationToken, dest: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retryer = Retryer::new(self.retry.clone());
        self.call_with(&mut retryer, cancel, dest, f).await
    }

    /// Like [`call`](Self::call), with a caller-owned retryer.
    pub async fn call_with<T, F, Fut>(
        &self,
        retryer: &mut Retryer,
        cancel: &CancellationToken,
        dest: &str,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breakers: &DestinationBreaker = &self.breakers;
        let result = retryer
            .run_with_result(cancel, move || {
                let attempt = f();
                breakers.execute_with_cancel(cancel, dest, move || attempt)
            })
            .await;

        if let Err(e) = &result {
            tracing::debug!(destination = %dest, error = %e, "Resilient call gave up");
        }
        result
    }
}
