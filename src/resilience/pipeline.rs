//! Retry-around-breaker composition.
//!
//! ```text
//! execute(call)
//!     → RetryPolicy (outer): loops while the outcome is transient
//!         → CircuitBreaker (inner): admit or reject with CircuitOpen
//!             → timeouts::with_deadline(call())
//!             → classifier::classify
//!         → permit.record(outcome)
//! ```
//!
//! The breaker sits inside the retry loop so a breaker that opens mid-sequence
//! ends the sequence on the next attempt instead of sleeping out the whole
//! schedule. Both layers use the same transient classification.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::classifier::classify;
use crate::resilience::outcome::{CallOutcome, InvocationResult};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::with_deadline;

/// One callable resilience unit for a single upstream target.
#[derive(Debug, Clone)]
pub struct PolicyPipeline {
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    attempt_timeout: Duration,
}

impl PolicyPipeline {
    pub fn new(retry: RetryPolicy, breaker: Arc<CircuitBreaker>, attempt_timeout: Duration) -> Self {
        Self {
            retry,
            breaker,
            attempt_timeout,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Worst-case duration of one call sequence.
    pub fn worst_case_latency(&self) -> Duration {
        self.attempt_timeout
            .saturating_mul(self.retry.attempt_budget())
            .saturating_add(self.retry.total_backoff())
    }

    /// Run `call` through retry and breaker.
    ///
    /// Dropping the returned future before it completes abandons the sequence
    /// and logs it as cancelled.
    pub async fn execute<F, Fut>(&self, call: F) -> CallOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InvocationResult>,
    {
        let guard = SequenceGuard::new(self.breaker.target());
        let outcome = self.run(call).await;
        guard.finish();
        outcome
    }

    /// Like [`execute`](Self::execute), abandoning the sequence when `cancel`
    /// resolves first.
    ///
    /// An abandoned sequence makes no further attempts and leaves the breaker
    /// as if the in-flight attempt never happened.
    pub async fn execute_until<F, Fut, C>(&self, call: F, cancel: C) -> CallOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InvocationResult>,
        C: Future<Output = ()>,
    {
        let guard = SequenceGuard::new(self.breaker.target());
        let outcome = tokio::select! {
            biased;
            _ = cancel => return CallOutcome::Cancelled,
            outcome = self.run(call) => outcome,
        };
        guard.finish();
        outcome
    }

    async fn run<F, Fut>(&self, mut call: F) -> CallOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InvocationResult>,
    {
        let target = self.breaker.target();

        self.retry
            .execute(target, |attempt| {
                let breaker = Arc::clone(&self.breaker);
                let deadline = self.attempt_timeout;
                // The upstream call is only built once the breaker admits it.
                let admitted = breaker.try_acquire().map(|permit| (permit, call()));

                async move {
                    let (permit, invocation) = match admitted {
                        Ok(admitted) => admitted,
                        Err(_) => {
                            tracing::warn!(
                                target_name = %breaker.target(),
                                attempt,
                                "Call rejected: circuit open, upstream not invoked"
                            );
                            return CallOutcome::CircuitOpen;
                        }
                    };

                    let result = with_deadline(deadline, invocation).await;
                    let outcome = classify(&result);

                    tracing::info!(
                        target_name = %breaker.target(),
                        attempt,
                        probe = permit.is_probe(),
                        outcome = %outcome,
                        "Upstream attempt completed"
                    );
                    metrics::record_attempt(breaker.target(), outcome.label());

                    permit.record(&outcome);
                    outcome
                }
            })
            .await
    }
}

/// Marks a call sequence in progress. Dropped unfinished, it reports the
/// sequence as cancelled.
struct SequenceGuard<'a> {
    target: &'a str,
    finished: bool,
}

impl<'a> SequenceGuard<'a> {
    fn new(target: &'a str) -> Self {
        Self {
            target,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(target_name = %self.target, "Call sequence cancelled");
            metrics::record_cancellation(self.target);
        }
    }
}
