//! Split-path tunnel resilience core.
//!
//! ```text
//! caller
//!     → resilience::ResiliencePolicy
//!         → DestinationBreaker (per destination) → CircuitBreaker
//!         → Retryer (jittered exponential backoff, cancellable waits)
//!     → session::SessionManager
//!         → Session → Stream (state, seq/ack counters)
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod resilience;
pub mod session;

pub use config::TunnelConfig;
pub use error::{Result, TunnelError};
pub use resilience::{
    backoff, BreakerState, CircuitBreaker, CircuitBreakerConfig, DestinationBreaker,
    ResiliencePolicy, RetryConfig, Retryer,
};
pub use session::{Session, SessionManager, SessionReaper, Stream, StreamState};
