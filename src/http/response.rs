//! Caller-facing results.
//!
//! | Outcome | Response |
//! |---|---|
//! | `Success(code)` | upstream status passed through |
//! | `CircuitOpen` | 503, no upstream attempt was made |
//! | `TimedOut` | 504 |
//! | `Cancelled` | 504 |
//! | other transient/permanent failure | 502 |
//!
//! Failures are `application/problem+json` bodies carrying the correlation ID.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::request::CorrelationId;
use crate::resilience::outcome::{CallOutcome, FailureReason};

/// RFC 7807 style problem body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub title: &'static str,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = (status, Json(self)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// Caller-facing status for a terminal outcome.
pub fn status_for(outcome: &CallOutcome) -> StatusCode {
    match outcome {
        CallOutcome::Success(status) => *status,
        CallOutcome::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        CallOutcome::TimedOut | CallOutcome::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        CallOutcome::TransientFailure(_) | CallOutcome::PermanentFailure(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

/// Build the problem body for a failed outcome. `None` for successes.
pub fn problem_for(outcome: &CallOutcome, correlation_id: &CorrelationId) -> Option<Problem> {
    let status = status_for(outcome).as_u16();
    let (title, detail) = match outcome {
        CallOutcome::Success(_) => return None,
        CallOutcome::CircuitOpen => ("External service unavailable", Some("circuit open".to_string())),
        CallOutcome::TimedOut => ("External service timeout", None),
        CallOutcome::Cancelled => ("External call cancelled", None),
        CallOutcome::TransientFailure(reason) | CallOutcome::PermanentFailure(reason) => {
            ("External service error", Some(describe(reason)))
        }
    };

    Some(Problem {
        title,
        status,
        detail,
        correlation_id: correlation_id.to_string(),
    })
}

fn describe(reason: &FailureReason) -> String {
    match reason {
        FailureReason::Status(status) => format!("upstream responded {}", status.as_u16()),
        other => other.to_string(),
    }
}

/// Map a terminal outcome to the response sent to the caller.
pub fn outcome_response(outcome: &CallOutcome, correlation_id: &CorrelationId) -> Response {
    match problem_for(outcome, correlation_id) {
        Some(problem) => problem.into_response(),
        None => status_for(outcome).into_response(),
    }
}
