//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tunnel's
//! resilience layer. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::retries::RetryConfig;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct TunnelConfig {
    /// Per-destination circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Reconnect / retry backoff.
    pub retry: RetrySettings,

    /// Session and stream limits.
    pub session: SessionSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the breaker opens.
    pub max_failures: u32,

    /// Time the breaker stays open before probing, in milliseconds.
    pub timeout_ms: u64,

    /// Trial requests allowed while half-open.
    pub max_half_open_requests: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout_ms: 30_000,
            max_half_open_requests: 1,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.max_failures,
            timeout: Duration::from_millis(self.timeout_ms),
            max_half_open_requests: self.max_half_open_requests,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on a single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Exponential growth factor.
    pub multiplier: f64,

    /// Relative jitter, 0.0 to 1.0.
    pub jitter: f64,

    /// Maximum retries (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 0,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
            max_attempts: self.max_attempts,
        }
    }
}

/// Session registry limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    /// Maximum concurrent sessions.
    pub max_sessions: usize,

    /// Maximum streams per session.
    pub max_streams_per_session: usize,

    /// Idle time after which a session is considered expired, in milliseconds.
    pub idle_timeout_ms: u64,

    /// How often the reaper sweeps for idle sessions, in milliseconds.
    pub reap_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 1_024,
            max_streams_per_session: 256,
            idle_timeout_ms: 300_000,
            reap_interval_ms: 30_000,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Use the compact single-line formatter.
    pub compact_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            compact_logs: false,
        }
    }
}
