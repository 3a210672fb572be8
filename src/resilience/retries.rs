//! Retry logic.
//!
//! # Responsibilities
//! - Hand out exponentially growing, jittered delays per attempt
//! - Enforce the attempt limit (0 = unlimited)
//! - Drive retry loops that stop on success, on a non-retryable error,
//!   on exhaustion, or on cancellation
//!
//! # Design Decisions
//! - Each `Retryer` owns its random source; seeding makes jitter reproducible
//! - `wait` is the only suspension point and never busy-polls
//! - Exhaustion and cancellation are distinct errors
//! - A non-retryable error is returned as-is without consuming an attempt

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TunnelError};
use crate::observability::metrics;
use crate::resilience::backoff::compute_delay;

/// Retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt (>= 1).
    pub multiplier: f64,
    /// Relative jitter in `[0, 1]`.
    pub jitter: f64,
    /// Maximum retries; 0 means unlimited.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 0,
        }
    }
}

impl RetryConfig {
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Stateful retry driver.
#[derive(Debug)]
pub struct Retryer {
    config: RetryConfig,
    attempts: u32,
    rng: StdRng,
}

impl Retryer {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a retryer with reproducible jitter.
    pub fn with_seed(config: RetryConfig, seed: u64) -> Self {
        Self {
            config,
            attempts: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Attempts made since creation, the last reset, or the last success.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Count one more attempt and return its delay.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        compute_delay(
            self.attempts,
            self.config.initial_delay,
            self.config.max_delay,
            self.config.multiplier,
            self.config.jitter,
            &mut self.rng,
        )
    }

    pub fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempts < self.config.max_attempts
    }

    /// Sleep for the next delay.
    ///
    /// Fails with `MaxRetriesExceeded` (without sleeping) once the limit is
    /// hit, or with `Cancelled` as soon as `cancel` fires.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(TunnelError::Cancelled);
        }
        if !self.should_retry() {
            return Err(TunnelError::MaxRetriesExceeded {
                attempts: self.attempts,
            });
        }

        let delay = self.next_delay();
        metrics::record_retry_attempt();
        tracing::debug!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "Backing off");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TunnelError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Retry `f` until it succeeds or the loop must stop.
    pub async fn run<F, Fut>(&mut self, cancel: &CancellationToken, f: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.run_with_result(cancel, f).await
    }

    /// Retry `f` and return its value on success.
    ///
    /// Non-retryable errors are returned untouched. Errors from `wait`
    /// (exhaustion or cancellation) end the loop.
    pub async fn run_with_result<T, F, Fut>(&mut self, cancel: &CancellationToken, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            match f().await {
                Ok(value) => {
                    self.reset();
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::debug!(attempts = self.attempts, error = %e, "Retryable failure");
                    self.wait(cancel).await?;
                }
            }
        }
    }
}

impl Default for Retryer {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
