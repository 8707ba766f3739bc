//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: upstream assumed down, calls fail fast
//! - Half-Open: a single probe tests whether the upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: on the first call after break_duration (lazy, no timer)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (opened_at reset)
//! ```
//!
//! # Design Decisions
//! - One breaker per named target, shared by every call sequence to it
//! - All transitions happen under one mutex, so counting and probe election
//!   are linearizable
//! - Calls are admitted through a [`BreakerPermit`]; a permit dropped without
//!   an outcome (cancelled attempt) is neither a success nor a failure

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::outcome::CallOutcome;

/// Breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerPhase::Closed => "closed",
            BreakerPhase::Open => "open",
            BreakerPhase::HalfOpen => "half_open",
        }
    }
}

/// Mutable state of one breaker. Only touched under the breaker's lock.
#[derive(Debug)]
struct BreakerState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    /// Set iff phase is Open or HalfOpen.
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            phase: BreakerPhase::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn trip(&mut self, now: Instant) {
        self.phase = BreakerPhase::Open;
        self.consecutive_failures = 0;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub phase: BreakerPhase,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
}

/// Returned when the breaker refuses a call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit for '{target}' is open")]
pub struct CircuitOpenError {
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Opened,
    HalfOpened,
    Closed,
    Reopened,
}

/// Circuit breaker guarding one upstream target.
#[derive(Debug)]
pub struct CircuitBreaker {
    target: String,
    failure_threshold: u32,
    break_duration: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker for `target`.
    pub fn new(target: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            target: target.into(),
            failure_threshold: config.failure_threshold.max(1),
            break_duration: Duration::from_secs(config.break_duration_secs),
            state: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn break_duration(&self) -> Duration {
        self.break_duration
    }

    /// Current phase.
    pub fn phase(&self) -> BreakerPhase {
        self.lock().phase
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            phase: state.phase,
            consecutive_failures: state.consecutive_failures,
            opened_at: state.opened_at,
        }
    }

    /// Ask to make one call.
    ///
    /// Closed admits everyone. Open rejects until `break_duration` has elapsed,
    /// then the first caller moves the breaker to Half-Open and becomes the
    /// probe. While the probe is in flight every other caller is rejected.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, CircuitOpenError> {
        let now = Instant::now();
        let mut transition = None;

        let admitted_as = {
            let mut state = self.lock();
            match state.phase {
                BreakerPhase::Closed => Some(false),
                BreakerPhase::Open => {
                    let aged = state
                        .opened_at
                        .map(|opened| now.saturating_duration_since(opened) >= self.break_duration)
                        .unwrap_or(true);
                    if aged {
                        state.phase = BreakerPhase::HalfOpen;
                        state.probe_in_flight = true;
                        transition = Some(Transition::HalfOpened);
                        Some(true)
                    } else {
                        None
                    }
                }
                BreakerPhase::HalfOpen => {
                    if state.probe_in_flight {
                        None
                    } else {
                        state.probe_in_flight = true;
                        Some(true)
                    }
                }
            }
        };

        if let Some(transition) = transition {
            self.notify(transition);
        }

        match admitted_as {
            Some(is_probe) => Ok(BreakerPermit {
                breaker: Arc::clone(self),
                is_probe,
                recorded: false,
            }),
            None => {
                tracing::debug!(target_name = %self.target, "Call rejected: circuit open");
                metrics::record_breaker_rejection(&self.target);
                Err(CircuitOpenError {
                    target: self.target.clone(),
                })
            }
        }
    }

    fn on_success(&self, is_probe: bool) {
        let transition = {
            let mut state = self.lock();
            match state.phase {
                BreakerPhase::Closed => {
                    state.consecutive_failures = 0;
                    None
                }
                BreakerPhase::HalfOpen if is_probe => {
                    *state = BreakerState::closed();
                    Some(Transition::Closed)
                }
                // Late result from a call admitted before the breaker tripped.
                _ => None,
            }
        };

        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    fn on_failure(&self, is_probe: bool) {
        let now = Instant::now();
        let transition = {
            let mut state = self.lock();
            match state.phase {
                BreakerPhase::Closed => {
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    if state.consecutive_failures >= self.failure_threshold {
                        state.trip(now);
                        Some(Transition::Opened)
                    } else {
                        None
                    }
                }
                BreakerPhase::HalfOpen if is_probe => {
                    state.trip(now);
                    Some(Transition::Reopened)
                }
                _ => None,
            }
        };

        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    fn release_probe(&self) {
        let mut state = self.lock();
        if state.phase == BreakerPhase::HalfOpen {
            state.probe_in_flight = false;
        }
    }

    fn notify(&self, transition: Transition) {
        match transition {
            Transition::Opened => {
                tracing::warn!(
                    target_name = %self.target,
                    break_duration_secs = self.break_duration.as_secs_f64(),
                    "Circuit opened"
                );
                metrics::record_breaker_transition(&self.target, BreakerPhase::Open);
            }
            Transition::Reopened => {
                tracing::warn!(
                    target_name = %self.target,
                    break_duration_secs = self.break_duration.as_secs_f64(),
                    "Circuit re-opened after failed probe"
                );
                metrics::record_breaker_transition(&self.target, BreakerPhase::Open);
            }
            Transition::HalfOpened => {
                tracing::info!(target_name = %self.target, "Circuit half-open, admitting probe");
                metrics::record_breaker_transition(&self.target, BreakerPhase::HalfOpen);
            }
            Transition::Closed => {
                tracing::info!(target_name = %self.target, "Circuit closed");
                metrics::record_breaker_transition(&self.target, BreakerPhase::Closed);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission to make one call through a breaker.
///
/// Report the classified outcome with [`BreakerPermit::record`]. Dropping the
/// permit unrecorded releases a Half-Open probe slot without a verdict.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    is_probe: bool,
    recorded: bool,
}

impl BreakerPermit {
    pub fn is_probe(&self) -> bool {
        self.is_probe
    }

    /// Feed the attempt's outcome back into the breaker.
    ///
    /// Transient outcomes count as failures; anything else that reached the
    /// upstream counts as success. `Cancelled` is neutral.
    pub fn record(mut self, outcome: &CallOutcome) {
        match outcome {
            CallOutcome::Cancelled | CallOutcome::CircuitOpen => return,
            o if o.is_transient() => self.breaker.on_failure(self.is_probe),
            _ => self.breaker.on_success(self.is_probe),
        }
        self.recorded = true;
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.recorded && self.is_probe {
            tracing::debug!(target_name = %self.breaker.target, "Probe abandoned, releasing slot");
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::outcome::FailureReason;
    use axum::http::StatusCode;

    fn breaker(threshold: u32, break_secs: u64) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "test-target",
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                break_duration_secs: break_secs,
            },
        ))
    }

    fn failure() -> CallOutcome {
        CallOutcome::TransientFailure(FailureReason::Status(StatusCode::INTERNAL_SERVER_ERROR))
    }

    fn fail_times(cb: &Arc<CircuitBreaker>, n: u32) {
        for _ in 0..n {
            cb.try_acquire().unwrap().record(&failure());
        }
    }

    #[tokio::test]
    async fn test_opens_after_threshold_for_any_threshold() {
        for threshold in 1..=7 {
            let cb = breaker(threshold, 20);
            fail_times(&cb, threshold - 1);
            assert_eq!(cb.phase(), BreakerPhase::Closed);
            assert_eq!(cb.snapshot().consecutive_failures, threshold - 1);

            fail_times(&cb, 1);
            assert_eq!(cb.phase(), BreakerPhase::Open);
            assert!(cb.snapshot().opened_at.is_some());
            assert!(cb.try_acquire().is_err());
        }
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let cb = breaker(5, 20);
        fail_times(&cb, 4);
        cb.try_acquire().unwrap().record(&CallOutcome::Success(StatusCode::OK));
        assert_eq!(cb.snapshot().consecutive_failures, 0);
        fail_times(&cb, 4);
        assert_eq!(cb.phase(), BreakerPhase::Closed);
    }

    #[tokio::test]
    async fn test_permanent_failure_does_not_count() {
        let cb = breaker(2, 20);
        let permanent = CallOutcome::PermanentFailure(FailureReason::Status(StatusCode::NOT_FOUND));
        for _ in 0..5 {
            cb.try_acquire().unwrap().record(&permanent);
        }
        assert_eq!(cb.phase(), BreakerPhase::Closed);
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let cb = breaker(1, 20);
        fail_times(&cb, 1);

        tokio::time::advance(Duration::from_secs(19)).await;
        assert!(cb.try_acquire().is_err());
        assert_eq!(cb.phase(), BreakerPhase::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        let probe = cb.try_acquire().expect("probe admitted");
        assert!(probe.is_probe());
        assert_eq!(cb.phase(), BreakerPhase::HalfOpen);

        for _ in 0..10 {
            assert!(cb.try_acquire().is_err());
        }
        drop(probe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_arrivals_elect_one_probe() {
        let cb = breaker(1, 20);
        fail_times(&cb, 1);
        tokio::time::advance(Duration::from_secs(20)).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cb = cb.clone();
            handles.push(tokio::spawn(async move {
                let permit = cb.try_acquire().ok();
                tokio::task::yield_now().await;
                permit.map(|p| {
                    let probe = p.is_probe();
                    std::mem::forget(p);
                    probe
                })
            }));
        }

        let mut admitted = 0;
        for h in handles {
            if let Some(is_probe) = h.await.unwrap() {
                assert!(is_probe);
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes() {
        let cb = breaker(2, 20);
        fail_times(&cb, 2);
        tokio::time::advance(Duration::from_secs(21)).await;

        cb.try_acquire().unwrap().record(&CallOutcome::Success(StatusCode::OK));
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.phase, BreakerPhase::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.opened_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_with_fresh_timestamp() {
        let cb = breaker(1, 20);
        fail_times(&cb, 1);
        let first_opened = cb.snapshot().opened_at.unwrap();

        tokio::time::advance(Duration::from_secs(25)).await;
        cb.try_acquire().unwrap().record(&CallOutcome::TimedOut);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.phase, BreakerPhase::Open);
        let reopened = snapshot.opened_at.unwrap();
        assert_eq!(reopened - first_opened, Duration::from_secs(25));

        // Full break duration applies again from the re-open.
        tokio::time::advance(Duration::from_secs(19)).await;
        assert!(cb.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_is_neutral() {
        let cb = breaker(1, 20);
        fail_times(&cb, 1);
        tokio::time::advance(Duration::from_secs(20)).await;

        let probe = cb.try_acquire().unwrap();
        drop(probe);
        assert_eq!(cb.phase(), BreakerPhase::HalfOpen);

        let next = cb.try_acquire().expect("slot released for another probe");
        assert!(next.is_probe());
        next.record(&CallOutcome::Cancelled);
        assert_eq!(cb.phase(), BreakerPhase::HalfOpen);
    }

    #[tokio::test]
    async fn test_late_success_does_not_close_open_breaker() {
        let cb = breaker(1, 20);
        let straggler = cb.try_acquire().unwrap();
        fail_times(&cb, 1);
        assert_eq!(cb.phase(), BreakerPhase::Open);

        straggler.record(&CallOutcome::Success(StatusCode::OK));
        assert_eq!(cb.phase(), BreakerPhase::Open);
    }

    #[tokio::test]
    async fn test_concurrent_failures_trip_exactly_once() {
        let cb = breaker(5, 20);
        let mut handles = Vec::new();
        for _ in 0..5 {
            let cb = cb.clone();
            handles.push(tokio::spawn(async move {
                cb.try_acquire().unwrap().record(&failure());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.phase, BreakerPhase::Open);
        assert_eq!(snapshot.consecutive_failures, 0);
    }
}
