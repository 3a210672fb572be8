//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate the backoff delay for `attempt` (1-indexed).
///
/// `delay = initial * multiplier^(attempt-1)`, perturbed by up to
/// `±delay*jitter`, then capped at `max`. Attempt 0 means "nothing tried
/// yet" and returns `initial` unchanged.
pub fn backoff(
    attempt: u32,
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
) -> Duration {
    if attempt == 0 {
        return initial;
    }
    compute_delay(attempt, initial, max, multiplier, jitter, &mut rand::thread_rng())
}

/// Backoff for `attempt >= 1` using the caller's random source.
pub(crate) fn compute_delay<R: Rng>(
    attempt: u32,
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    rng: &mut R,
) -> Duration {
    let max_nanos = max.as_nanos() as f64;
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let mut delay = initial.as_nanos() as f64 * multiplier.powi(exponent);

    if !delay.is_finite() {
        return max;
    }

    if jitter > 0.0 {
        delay *= 1.0 + jitter * rng.gen_range(-1.0..=1.0);
    }

    let clamped = delay.clamp(0.0, max_nanos);
    Duration::from_nanos(clamped as u64)
}
