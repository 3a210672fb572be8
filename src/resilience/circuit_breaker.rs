//! Circuit breaker guarding calls to one logical target.
//!
//! # States
//! - Closed: normal operation, calls pass through, failures are counted
//! - Open: target assumed down, calls fail fast with `CircuitOpen`
//! - Half-Open: a bounded number of trial calls probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures >= max_failures
//! Open → Half-Open: timeout elapsed since opened_at (checked lazily)
//! Half-Open → Closed: successes >= max_half_open_requests
//! Half-Open → Open: any single failure
//! ```
//!
//! # Design Decisions
//! - No background timer; Open → Half-Open is computed on access
//! - A single success in Closed clears the failure count (no rolling window)
//! - Every counter is zeroed on every transition
//! - The state-change hook runs synchronously while the exclusive lock is
//!   held. It must not call back into the same breaker or it will deadlock.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TunnelError};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Numeric encoding used for gauges (0=closed, 1=half-open, 2=open).
    pub fn as_gauge(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::HalfOpen => 1.0,
            BreakerState::Open => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed before tripping.
    pub max_failures: u32,
    /// How long the breaker stays Open before probing.
    pub timeout: Duration,
    /// Trial calls allowed in Half-Open, and successes needed to close.
    pub max_half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout: Duration::from_secs(30),
            max_half_open_requests: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_half_open_requests(mut self, max: u32) -> Self {
        self.max_half_open_requests = max.max(1);
        self
    }
}

/// Observer invoked with `(from, to)` on every transition.
pub type StateChangeHook = Box<dyn Fn(BreakerState, BreakerState) + Send + Sync>;

/// Read-only snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub failures: u32,
    pub successes: u32,
    pub half_open_requests: u32,
    /// Time since the most recent recorded failure.
    pub since_last_failure: Option<Duration>,
    /// Time spent in Open so far, if physically open.
    pub open_for: Option<Duration>,
}

struct Inner {
    state: BreakerState,
    failures: u32,
    successes: u32,
    half_open_requests: u32,
    /// Bumped on every entry into Half-Open; tags trial slots.
    half_open_episode: u64,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    on_state_change: Option<StateChangeHook>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            successes: 0,
            half_open_requests: 0,
            half_open_episode: 0,
            last_failure: None,
            opened_at: None,
            on_state_change: None,
        }
    }

    fn open_timeout_elapsed(&self, timeout: Duration, now: Instant) -> bool {
        self.state == BreakerState::Open
            && self
                .opened_at
                .is_some_and(|opened| now.saturating_duration_since(opened) >= timeout)
    }

    fn effective_state(&self, timeout: Duration, now: Instant) -> BreakerState {
        if self.open_timeout_elapsed(timeout, now) {
            BreakerState::HalfOpen
        } else {
            self.state
        }
    }

    /// Apply the lazy Open → Half-Open transition if it is due.
    fn promote(&mut self, timeout: Duration, now: Instant) {
        if self.open_timeout_elapsed(timeout, now) {
            self.transition(BreakerState::HalfOpen, now);
        }
    }

    fn transition(&mut self, to: BreakerState, now: Instant) {
        let from = self.state;
        if from == to {
            return;
        }

        self.state = to;
        self.failures = 0;
        self.successes = 0;
        self.half_open_requests = 0;
        match to {
            BreakerState::Open => self.opened_at = Some(now),
            BreakerState::HalfOpen => self.half_open_episode += 1,
            BreakerState::Closed => {}
        }

        tracing::debug!(from = %from, to = %to, "Circuit breaker transition");

        if let Some(hook) = &self.on_state_change {
            hook(from, to);
        }
    }
}

/// How a call got past the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Closed,
    /// Holds a trial slot from the given Half-Open episode.
    Trial(u64),
}

/// A three-state circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Install the transition observer, replacing any previous one.
    ///
    /// The hook runs under the breaker's exclusive lock and must not
    /// re-enter this breaker.
    pub fn set_on_state_change<F>(&self, hook: F)
    where
        F: Fn(BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.write().on_state_change = Some(Box::new(hook));
    }

    /// Check whether a call may proceed.
    ///
    /// May move Open → Half-Open and consumes a trial slot in Half-Open.
    pub fn allow(&self) -> bool {
        self.admit().is_some()
    }

    fn admit(&self) -> Option<Admission> {
        let now = Instant::now();
        let mut inner = self.write();
        inner.promote(self.config.timeout, now);

        let state = inner.state;
        match state {
            BreakerState::Closed => Some(Admission::Closed),
            BreakerState::Open => None,
            BreakerState::HalfOpen => {
                if inner.half_open_requests < self.config.max_half_open_requests {
                    inner.half_open_requests += 1;
                    Some(Admission::Trial(inner.half_open_episode))
                } else {
                    None
                }
            }
        }
    }

    pub fn record_success(&self) {
        let now = Instant::now();
        let mut inner = self.write();
        inner.promote(self.config.timeout, now);

        let state = inner.state;
        match state {
            BreakerState::Closed => inner.failures = 0,
            BreakerState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.max_half_open_requests {
                    inner.transition(BreakerState::Closed, now);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.write();
        inner.last_failure = Some(now);
        inner.promote(self.config.timeout, now);

        let state = inner.state;
        match state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.max_failures {
                    inner.transition(BreakerState::Open, now);
                }
            }
            BreakerState::HalfOpen => inner.transition(BreakerState::Open, now),
            BreakerState::Open => {}
        }
    }

    /// Run `f` through the breaker.
    ///
    /// Returns `CircuitOpen` without calling `f` when denied; otherwise
    /// records the outcome and passes `f`'s result through untouched.
    pub fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if !self.allow() {
            return Err(TunnelError::CircuitOpen);
        }
        self.record_outcome(f())
    }

    /// Async variant of [`execute`](Self::execute) that honours cancellation.
    ///
    /// A call cancelled in flight is dropped and records neither success nor
    /// failure. A Half-Open trial slot it holds is handed back, but only to
    /// the episode that granted it.
    pub async fn execute_with_cancel<T, F, Fut>(&self, cancel: &CancellationToken, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(TunnelError::Cancelled);
        }
        let Some(admission) = self.admit() else {
            return Err(TunnelError::CircuitOpen);
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Admission::Trial(episode) = admission {
                    self.release_trial(episode);
                }
                Err(TunnelError::Cancelled)
            }
            result = f() => self.record_outcome(result),
        }
    }

    /// Force the breaker back to Closed.
    pub fn reset(&self) {
        self.write().transition(BreakerState::Closed, Instant::now());
    }

    /// Current effective state, applying a due Open → Half-Open transition.
    pub fn state(&self) -> BreakerState {
        let now = Instant::now();
        {
            let inner = self.read();
            if !inner.open_timeout_elapsed(self.config.timeout, now) {
                return inner.state;
            }
        }

        let mut inner = self.write();
        inner.promote(self.config.timeout, now);
        inner.state
    }

    /// Snapshot of the effective state and counters.
    pub fn stats(&self) -> BreakerStats {
        let now = Instant::now();
        let inner = self.read();
        let state = inner.effective_state(self.config.timeout, now);
        let physically_open = inner.state == BreakerState::Open && state == BreakerState::Open;

        BreakerStats {
            state,
            failures: inner.failures,
            successes: inner.successes,
            half_open_requests: inner.half_open_requests,
            since_last_failure: inner.last_failure.map(|at| now.saturating_duration_since(at)),
            open_for: inner
                .opened_at
                .filter(|_| physically_open)
                .map(|at| now.saturating_duration_since(at)),
        }
    }

    fn record_outcome<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    fn release_trial(&self, episode: u64) {
        let mut inner = self.write();
        if inner.state == BreakerState::HalfOpen && inner.half_open_episode == episode {
            inner.half_open_requests = inner.half_open_requests.saturating_sub(1);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("CircuitBreaker")
            .field("state", &inner.state)
            .field("failures", &inner.failures)
            .field("config", &self.config)
            .finish()
    }
}
