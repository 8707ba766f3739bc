//! Retry logic.
//!
//! # Responsibilities
//! - Re-invoke an attempt while its outcome is transient
//! - Wait out an exponential backoff between attempts without blocking a
//!   worker thread (tokio sleep)
//! - Bound the sequence by `max_attempts`
//!
//! # Design Decisions
//! - Only transient outcomes are retried; `CircuitOpen` fails fast
//! - Exhaustion is not an error of its own: the last outcome is returned
//! - Every scheduled retry is logged with attempt and delay

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::{apply_jitter, calculate_backoff, total_backoff};
use crate::resilience::outcome::CallOutcome;

/// Per-sequence retry bookkeeping. Owned by one call sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Index of the current attempt, starting at 0.
    pub attempt: u32,
    /// Delay computed before the current attempt.
    pub delay: Duration,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    enabled: bool,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_ratio: config.jitter_ratio,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upstream calls one sequence can make.
    pub fn attempt_budget(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Delay to wait after a transient failure at `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        apply_jitter(
            calculate_backoff(attempt, self.base_delay, self.max_delay),
            self.jitter_ratio,
        )
    }

    /// Upper bound on the time spent sleeping by one sequence (without jitter).
    pub fn total_backoff(&self) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        total_backoff(self.max_attempts, self.base_delay, self.max_delay).unwrap_or(Duration::MAX)
    }

    /// Drive `attempt_fn` until it yields a non-transient outcome or the
    /// attempt budget is spent.
    ///
    /// A transient failure at index `a < max_attempts` waits `delay_for(a)`
    /// and moves to `a + 1`; when the index reaches `max_attempts` the last
    /// outcome is returned without another call.
    pub async fn execute<F, Fut>(&self, target: &str, mut attempt_fn: F) -> CallOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = CallOutcome>,
    {
        let mut state = RetryState::default();

        loop {
            let outcome = attempt_fn(state.attempt).await;

            if !outcome.is_transient() || !self.enabled || state.attempt >= self.max_attempts {
                return outcome;
            }

            state.delay = self.delay_for(state.attempt);
            tracing::warn!(
                target_name = %target,
                attempt = state.attempt,
                retry = state.attempt + 1,
                delay_ms = state.delay.as_millis() as u64,
                reason = %outcome,
                "Retry {} after {}s",
                state.attempt + 1,
                state.delay.as_secs_f64()
            );
            metrics::record_retry(target);

            tokio::time::sleep(state.delay).await;
            state.attempt += 1;

            if state.attempt >= self.max_attempts {
                tracing::warn!(
                    target_name = %target,
                    attempts = state.attempt,
                    outcome = %outcome,
                    "Retries exhausted"
                );
                return outcome;
            }
        }
    }
}
