//! Outcome types shared by the resilience pipeline.
//!
//! An upstream invocation produces a raw `Result<StatusCode, InvokeError>`.
//! The classifier turns that into a [`CallOutcome`], which is what the retry
//! policy, the circuit breaker and the handler reason about.

use axum::http::StatusCode;
use std::fmt;
use thiserror::Error;

/// Raw result of one upstream invocation.
pub type InvocationResult = Result<StatusCode, InvokeError>;

/// Faults raised by the upstream invoker instead of a completed response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    /// The per-attempt deadline elapsed.
    #[error("upstream request timed out")]
    Timeout,

    /// Transport fault: refused, reset, or closed before a response arrived.
    #[error("upstream connection failed: {0}")]
    Connect(String),

    /// The request was rejected by the client itself (redirect policy).
    #[error("upstream request failed: {0}")]
    Request(String),

    /// The outbound request could not be constructed.
    #[error("invalid upstream request: {0}")]
    Build(String),
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Upstream answered with a failing status code.
    Status(StatusCode),
    /// Connection-level fault.
    Connection(String),
    /// Any other raised fault.
    Fault(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status(status) => write!(f, "status {}", status.as_u16()),
            FailureReason::Connection(msg) => write!(f, "connection: {}", msg),
            FailureReason::Fault(msg) => write!(f, "fault: {}", msg),
        }
    }
}

/// Classified result of an attempt or of a whole call sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Completed with a non-failing status (2xx/3xx).
    Success(StatusCode),
    /// Retryable failure (5xx, 408, connection fault).
    TransientFailure(FailureReason),
    /// Final failure, never retried (other 4xx, generic faults).
    PermanentFailure(FailureReason),
    /// The per-attempt deadline elapsed. Retryable.
    TimedOut,
    /// Rejected by an open breaker; the upstream was not invoked.
    CircuitOpen,
    /// The call sequence was abandoned by the caller.
    Cancelled,
}

impl CallOutcome {
    /// Whether the retry policy may try again after this outcome.
    pub fn is_transient(&self) -> bool {
        matches!(self, CallOutcome::TransientFailure(_) | CallOutcome::TimedOut)
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Success(_) => "success",
            CallOutcome::TransientFailure(_) => "transient_failure",
            CallOutcome::PermanentFailure(_) => "permanent_failure",
            CallOutcome::TimedOut => "timed_out",
            CallOutcome::CircuitOpen => "circuit_open",
            CallOutcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Success(status) => write!(f, "success ({})", status.as_u16()),
            CallOutcome::TransientFailure(reason) => write!(f, "transient failure ({})", reason),
            CallOutcome::PermanentFailure(reason) => write!(f, "permanent failure ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}
