//! Failure classification.
//!
//! # Rules
//! - 5xx and 408 are transient
//! - Connection faults are transient
//! - Request timeouts are transient but surface as `TimedOut`
//! - Other 4xx and generic faults are permanent, never retried
//! - 2xx/3xx are successes

use axum::http::StatusCode;

use crate::resilience::outcome::{CallOutcome, FailureReason, InvocationResult, InvokeError};

/// Classify the raw result of one upstream invocation.
pub fn classify(result: &InvocationResult) -> CallOutcome {
    match result {
        Ok(status) => classify_status(*status),
        Err(InvokeError::Timeout) => CallOutcome::TimedOut,
        Err(InvokeError::Connect(msg)) => {
            CallOutcome::TransientFailure(FailureReason::Connection(msg.clone()))
        }
        Err(InvokeError::Request(msg)) | Err(InvokeError::Build(msg)) => {
            CallOutcome::PermanentFailure(FailureReason::Fault(msg.clone()))
        }
    }
}

fn classify_status(status: StatusCode) -> CallOutcome {
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        CallOutcome::TransientFailure(FailureReason::Status(status))
    } else if status.is_client_error() {
        CallOutcome::PermanentFailure(FailureReason::Status(status))
    } else {
        CallOutcome::Success(status)
    }
}
