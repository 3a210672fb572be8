//! Shared utilities for integration and load testing.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use split_tunnel::{RetryConfig, TunnelError};

/// A destination that fails `failures` times before it starts answering.
#[derive(Clone)]
pub struct FlakyDestination {
    failures: u32,
    calls: Arc<AtomicU32>,
}

impl FlakyDestination {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// One attempt against the destination.
    pub fn attempt(&self) -> impl Future<Output = Result<u32, TunnelError>> + Send + 'static {
        let calls = self.calls.clone();
        let failures = self.failures;
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                Err(TunnelError::Unavailable(format!("attempt {} refused", n + 1)))
            } else {
                Ok(n + 1)
            }
        }
    }
}

/// Retry settings fast enough for tests.
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::default()
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_jitter(0.0)
        .with_max_attempts(max_attempts)
}
