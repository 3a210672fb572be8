//! Metrics recording.
//!
//! # Metrics
//! - `tunnel_breaker_transitions_total` (counter): by destination, from, to
//! - `tunnel_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `tunnel_breaker_rejections_total` (counter): calls refused by an open breaker
//! - `tunnel_retry_attempts_total` (counter): backoff waits started
//! - `tunnel_sessions_active` (gauge): live sessions
//! - `tunnel_sessions_expired_total` (counter): sessions evicted for idleness
//! - `tunnel_streams_active` (gauge): live streams across all sessions
//!
//! Without an installed recorder every call here is a no-op.

use crate::resilience::circuit_breaker::BreakerState;

pub fn record_breaker_transition(destination: &str, from: BreakerState, to: BreakerState) {
    metrics::counter!(
        "tunnel_breaker_transitions_total",
        "destination" => destination.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);

    metrics::gauge!("tunnel_breaker_state", "destination" => destination.to_string())
        .set(to.as_gauge());
}

pub fn record_breaker_rejection(destination: &str) {
    metrics::counter!(
        "tunnel_breaker_rejections_total",
        "destination" => destination.to_string()
    )
    .increment(1);
}

pub fn record_retry_attempt() {
    metrics::counter!("tunnel_retry_attempts_total").increment(1);
}

pub fn record_session_count(count: usize) {
    metrics::gauge!("tunnel_sessions_active").set(count as f64);
}

pub fn record_session_expired(count: usize) {
    metrics::counter!("tunnel_sessions_expired_total").increment(count as u64);
}

/// Adjust the live stream gauge by `delta` streams.
pub fn record_stream_delta(delta: isize) {
    let gauge = metrics::gauge!("tunnel_streams_active");
    if delta >= 0 {
        gauge.increment(delta as f64);
    } else {
        gauge.decrement(delta.unsigned_abs() as f64);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::GaugeRecorder;
    use super::*;

    #[test]
    fn test_stream_delta_moves_gauge_both_ways() {
        let recorder = GaugeRecorder::default();
        metrics::with_local_recorder(&recorder, || {
            record_stream_delta(3);
            record_stream_delta(-2);
        });
        assert_eq!(recorder.gauge("tunnel_streams_active"), 1.0);
    }

    #[test]
    fn test_session_count_sets_gauge() {
        let recorder = GaugeRecorder::default();
        metrics::with_local_recorder(&recorder, || record_session_count(4));
        assert_eq!(recorder.gauge("tunnel_sessions_active"), 4.0);
    }
}
