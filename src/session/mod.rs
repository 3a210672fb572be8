//! Session and stream bookkeeping.
//!
//! # Data Flow
//! ```text
//! manager.rs (sessions by id, global cap, idle eviction)
//!     → registry.rs (one session: its streams and idle clock)
//!         → stream.rs (state, seq/ack counters)
//! reaper.rs drives manager.rs cleanup on an interval (optional)
//! ```
//!
//! # Design Decisions
//! - Session map, stream map and stream fields each have their own lock
//! - The registry stores stream state without enforcing transitions
//! - Removed streams leave no history behind

pub mod manager;
pub mod reaper;
pub mod registry;
pub mod stream;

pub use manager::SessionManager;
pub use reaper::SessionReaper;
pub use registry::Session;
pub use stream::{Stream, StreamState};
