//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TunnelConfig (validated, immutable)
//!     → sections converted into breaker / retry / session settings
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::CircuitBreakerSettings;
pub use schema::ObservabilityConfig;
pub use schema::RetrySettings;
pub use schema::SessionSettings;
pub use schema::TunnelConfig;
