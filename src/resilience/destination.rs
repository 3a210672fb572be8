//! Per-destination circuit breakers.
//!
//! # Responsibilities
//! - Own one breaker per destination key, created lazily on first use
//! - Isolate failures: a tripped destination never affects another
//! - Forward every transition to logging and metrics
//!
//! # Design Decisions
//! - Lookups take the shared lock; creation re-checks under the exclusive lock
//! - Entries are only removed by an explicit `remove`

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TunnelError};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{
    BreakerState, BreakerStats, CircuitBreaker, CircuitBreakerConfig,
};

/// Registry of circuit breakers keyed by destination.
#[derive(Debug)]
pub struct DestinationBreaker {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl DestinationBreaker {
    /// Create an empty registry; every breaker it creates uses `config`.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the breaker for `dest`, creating it on first access.
    pub fn get(&self, dest: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cb) = breakers.get(dest) {
                return cb.clone();
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cb) = breakers.get(dest) {
            return cb.clone();
        }

        let cb = Arc::new(CircuitBreaker::new(self.config.clone()));
        let destination = dest.to_string();
        cb.set_on_state_change(move |from, to| {
            match to {
                BreakerState::Open => {
                    tracing::warn!(destination = %destination, from = %from, "Circuit opened")
                }
                BreakerState::HalfOpen => {
                    tracing::info!(destination = %destination, "Circuit half-open, probing")
                }
                BreakerState::Closed => {
                    tracing::info!(destination = %destination, from = %from, "Circuit closed")
                }
            }
            metrics::record_breaker_transition(&destination, from, to);
        });

        tracing::debug!(destination = %dest, "Created circuit breaker");
        breakers.insert(dest.to_string(), cb.clone());
        cb
    }

    /// Drop the breaker for `dest`. The next `get` starts with no history.
    pub fn remove(&self, dest: &str) -> bool {
        self.breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(dest)
            .is_some()
    }

    /// Force every breaker to Closed.
    pub fn reset(&self) {
        for cb in self.snapshot() {
            cb.reset();
        }
    }

    /// Force one destination's breaker to Closed, if it exists.
    pub fn reset_destination(&self, dest: &str) {
        let cb = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dest)
            .cloned();
        if let Some(cb) = cb {
            cb.reset();
        }
    }

    pub fn is_allowed(&self, dest: &str) -> bool {
        self.get(dest).allow()
    }

    pub fn record_success(&self, dest: &str) {
        self.get(dest).record_success();
    }

    pub fn record_failure(&self, dest: &str) {
        self.get(dest).record_failure();
    }

    /// Run `f` through the breaker for `dest`.
    pub fn execute<T, F>(&self, dest: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let result = self.get(dest).execute(f);
        if matches!(result, Err(TunnelError::CircuitOpen)) {
            metrics::record_breaker_rejection(dest);
        }
        result
    }

    /// Run async `f` through the breaker for `dest`, honouring `cancel`.
    pub async fn execute_with_cancel<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        dest: &str,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cb = self.get(dest);
        let result = cb.execute_with_cancel(cancel, f).await;
        if matches!(result, Err(TunnelError::CircuitOpen)) {
            metrics::record_breaker_rejection(dest);
        }
        result
    }

    /// Snapshot of every known destination. Order is unspecified.
    pub fn all_stats(&self) -> HashMap<String, BreakerStats> {
        let entries: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        entries
            .into_iter()
            .map(|(dest, cb)| (dest, cb.stats()))
            .collect()
    }

    /// Stats for every destination as a JSON object keyed by destination.
    pub fn stats_json(&self) -> serde_json::Value {
        let stats: serde_json::Map<String, serde_json::Value> = self
            .all_stats()
            .into_iter()
            .map(|(dest, s)| {
                let value = serde_json::json!({
                    "state": s.state,
                    "failures": s.failures,
                    "successes": s.successes,
                    "half_open_requests": s.half_open_requests,
                    "since_last_failure_ms": s.since_last_failure.map(|d| d.as_millis() as u64),
                    "open_for_ms": s.open_for.map(|d| d.as_millis() as u64),
                });
                (dest, value)
            })
            .collect();
        serde_json::Value::Object(stats)
    }

    /// Number of destinations currently tracked.
    pub fn count(&self) -> usize {
        self.breakers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl Default for DestinationBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn registry(max_failures: u32) -> DestinationBreaker {
        DestinationBreaker::new(
            CircuitBreakerConfig::default()
                .with_max_failures(max_failures)
                .with_timeout(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_stats_json() {
        let reg = registry(1);
        reg.record_failure("a");
        reg.record_success("b");

        let json = reg.stats_json();
        assert_eq!(json["a"]["state"], "open");
        assert_eq!(json["b"]["state"], "closed");
        assert_eq!(json["b"]["since_last_failure_ms"], serde_json::Value::Null);
    }

    #[test]
    fn test_get_returns_same_instance() {
        let reg = registry(3);
        let a1 = reg.get("upstream.example:443");
        let a2 = reg.get("upstream.example:443");
        let b = reg.get("downstream.example:443");

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn test_failures_are_isolated() {
        let reg = registry(2);
        reg.record_failure("a");
        reg.record_failure("a");

        assert!(!reg.is_allowed("a"));
        assert!(reg.is_allowed("b"));
        assert_eq!(reg.get("b").state(), BreakerState::Closed);
    }

    #[test]
    fn test_remove_forgets_history() {
        let reg = registry(1);
        reg.record_failure("a");
        assert_eq!(reg.get("a").state(), BreakerState::Open);

        assert!(reg.remove("a"));
        assert!(!reg.remove("a"));
        assert_eq!(reg.get("a").state(), BreakerState::Closed);
    }

    #[test]
    fn test_reset_all_and_one() {
        let reg = registry(1);
        reg.record_failure("a");
        reg.record_failure("b");

        reg.reset_destination("a");
        assert_eq!(reg.get("a").state(), BreakerState::Closed);
        assert_eq!(reg.get("b").state(), BreakerState::Open);

        reg.reset();
        assert_eq!(reg.get("b").state(), BreakerState::Closed);

        // Unknown destinations are not created by a reset.
        reg.reset_destination("c");
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn test_execute_rejects_open_destination() {
        let reg = registry(1);
        let err = reg
            .execute::<(), _>("a", || Err(TunnelError::ConnectionClosed))
            .unwrap_err();
        assert!(matches!(err, TunnelError::ConnectionClosed));

        let err = reg.execute("a", || Ok(())).unwrap_err();
        assert!(matches!(err, TunnelError::CircuitOpen));
        assert!(reg.execute("b", || Ok(1)).is_ok());
    }

    #[test]
    fn test_all_stats() {
        let reg = registry(1);
        reg.record_failure("a");
        reg.record_success("b");

        let stats = reg.all_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["a"].state, BreakerState::Open);
        assert_eq!(stats["b"].state, BreakerState::Closed);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_breaker() {
        let reg = Arc::new(registry(3));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                thread::spawn(move || reg.get("shared"))
            })
            .collect();

        let breakers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for cb in &breakers[1..] {
            assert!(Arc::ptr_eq(&breakers[0], cb));
        }
        assert_eq!(reg.count(), 1);
    }

    #[tokio::test]
    async fn test_execute_with_cancel() {
        let reg = registry(1);
        let token = CancellationToken::new();

        let value = reg
            .execute_with_cancel(&token, "a", || async { Ok(5u8) })
            .await
            .unwrap();
        assert_eq!(value, 5);

        token.cancel();
        let err = reg
            .execute_with_cancel(&token, "a", || async { Ok(5u8) })
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Cancelled));
    }
}
