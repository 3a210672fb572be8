//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Operation against a destination:
//!     → destination.rs (pick that destination's breaker)
//!     → circuit_breaker.rs (allow / reject, record outcome)
//!     → timeouts.rs (optional deadline, overrun counts as failure)
//!     → On retryable failure: retries.rs (wait next backoff.rs delay, retry)
//!     → policy.rs ties the above together for one logical call
//! ```
//!
//! # Design Decisions
//! - Per-destination breakers (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Jittered backoff prevents thundering herd
//! - Cancellation is observed at every suspension point

pub mod backoff;
pub mod circuit_breaker;
pub mod destination;
pub mod policy;
pub mod retries;
pub mod timeouts;

pub use backoff::backoff;
pub use circuit_breaker::{BreakerState, BreakerStats, CircuitBreaker, CircuitBreakerConfig};
pub use destination::DestinationBreaker;
pub use policy::ResiliencePolicy;
pub use retries::{RetryConfig, Retryer};
