//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, retry loops and the session manager produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via the `metrics` facade)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Whatever metrics recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - This crate records metrics but never installs an exporter
//! - Breaker transitions are forwarded from the state-change hook

pub mod logging;
pub mod metrics;
