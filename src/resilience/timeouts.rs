//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every upstream attempt with a fixed deadline
//! - Map an elapsed deadline to `InvokeError::Timeout`
//!
//! # Design Decisions
//! - Uses Tokio's timer; the attempt future is dropped when the deadline hits
//! - The per-attempt deadline is independent of the retry budget

use std::future::Future;
use std::time::Duration;

use crate::resilience::outcome::{InvocationResult, InvokeError};

/// Run one attempt under `deadline`.
pub async fn with_deadline<F>(deadline: Duration, attempt: F) -> InvocationResult
where
    F: Future<Output = InvocationResult>,
{
    match tokio::time::timeout(deadline, attempt).await {
        Ok(result) => result,
        Err(_) => Err(InvokeError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let result = with_deadline(Duration::from_secs(3), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(StatusCode::OK)
        })
        .await;
        assert_eq!(result, Err(InvokeError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_attempt_passes_through() {
        let result = with_deadline(Duration::from_secs(3), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(StatusCode::ACCEPTED)
        })
        .await;
        assert_eq!(result, Ok(StatusCode::ACCEPTED));
    }
}
