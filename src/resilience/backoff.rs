//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate the delay to wait after a transient failure at `attempt`.
///
/// `delay = base * 2^attempt`, capped at `max`. With a base of one second
/// attempts 0, 1, 2 wait 1s, 2s, 4s.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let exponential = 2u64.saturating_pow(attempt);
    let delay_ms = base_ms.saturating_mul(exponential);
    Duration::from_millis(delay_ms).min(max)
}

/// Sum of the delays after attempts `0..attempts`, or `None` on overflow.
pub fn total_backoff(attempts: u32, base: Duration, max: Duration) -> Option<Duration> {
    let mut total = Duration::ZERO;
    for attempt in 0..attempts {
        let delay = calculate_backoff(attempt, base, max);
        if delay.is_zero() {
            break;
        }
        if delay == max {
            // Every remaining delay is capped.
            return total.checked_add(max.checked_mul(attempts - attempt)?);
        }
        total = total.checked_add(delay)?;
    }
    Some(total)
}

/// Add up to `ratio` of random jitter on top of `delay`.
pub fn apply_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return delay;
    }

    let jitter_range = (delay.as_millis() as f64 * ratio.min(1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}
