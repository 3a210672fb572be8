//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, jitter in [0, 1], max >= initial)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TunnelConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::TunnelConfig;

/// A single rejected setting.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let cb = &config.circuit_breaker;
    if cb.max_failures == 0 {
        errors.push(ValidationError::new("circuit_breaker.max_failures", "must be greater than 0"));
    }
    if cb.timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.timeout_ms", "must be greater than 0"));
    }
    if cb.max_half_open_requests == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.max_half_open_requests",
            "must be greater than 0",
        ));
    }

    let retry = &config.retry;
    if retry.initial_delay_ms == 0 {
        errors.push(ValidationError::new("retry.initial_delay_ms", "must be greater than 0"));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            format!("must be >= initial_delay_ms ({})", retry.initial_delay_ms),
        ));
    }
    if retry.multiplier.is_nan() || retry.multiplier < 1.0 {
        errors.push(ValidationError::new("retry.multiplier", "must be >= 1.0"));
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        errors.push(ValidationError::new("retry.jitter", "must be within [0.0, 1.0]"));
    }

    let session = &config.session;
    if session.max_sessions == 0 {
        errors.push(ValidationError::new("session.max_sessions", "must be greater than 0"));
    }
    if session.max_streams_per_session == 0 {
        errors.push(ValidationError::new(
            "session.max_streams_per_session",
            "must be greater than 0",
        ));
    }
    if session.idle_timeout_ms == 0 {
        errors.push(ValidationError::new("session.idle_timeout_ms", "must be greater than 0"));
    }
    if session.reap_interval_ms == 0 {
        errors.push(ValidationError::new("session.reap_interval_ms", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&TunnelConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = TunnelConfig::default();
        config.circuit_breaker.max_failures = 0;
        config.retry.initial_delay_ms = 500;
        config.retry.max_delay_ms = 100;
        config.retry.multiplier = 0.5;
        config.retry.jitter = 1.5;
        config.session.max_sessions = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "circuit_breaker.max_failures",
                "retry.max_delay_ms",
                "retry.multiplier",
                "retry.jitter",
                "session.max_sessions",
            ]
        );
    }

    #[test]
    fn test_nan_multiplier_rejected() {
        let mut config = TunnelConfig::default();
        config.retry.multiplier = f64::NAN;
        assert!(validate_config(&config).is_err());
    }
}
