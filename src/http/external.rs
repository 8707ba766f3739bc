//! Resilient external-call endpoint.
//!
//! Builds the upstream call for the configured path, runs it through the
//! policy pipeline inside the request's correlation span, and translates the
//! terminal outcome into the caller-facing response. This is the only place
//! outcomes become HTTP statuses.
//!
//! A client disconnect drops the handler future, which drops the pipeline
//! mid-sequence: no further retries happen, any in-flight breaker permit is
//! released without a verdict, and the pipeline logs the sequence as
//! cancelled.

use axum::{extract::State, response::Response};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::GatewayConfig;
use crate::http::request::CorrelationId;
use crate::http::response::{outcome_response, status_for};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::{BreakerRegistry, CallOutcome, PolicyPipeline, RetryPolicy};
use crate::upstream::{UpstreamInvoker, UpstreamRequest};

/// Orchestrates one external call per inbound request.
pub struct ResilientCallHandler {
    pipeline: PolicyPipeline,
    invoker: Arc<dyn UpstreamInvoker>,
    path: String,
    attempt_timeout: Duration,
}

impl ResilientCallHandler {
    pub fn new(
        config: &GatewayConfig,
        registry: &BreakerRegistry,
        invoker: Arc<dyn UpstreamInvoker>,
    ) -> Self {
        let attempt_timeout = config.upstream.timeout();
        let breaker = registry.get_or_register(&config.upstream.name);
        let pipeline = PolicyPipeline::new(RetryPolicy::new(&config.retries), breaker, attempt_timeout);

        Self {
            pipeline,
            invoker,
            path: config.upstream.path.clone(),
            attempt_timeout,
        }
    }

    pub fn pipeline(&self) -> &PolicyPipeline {
        &self.pipeline
    }

    /// Run the call sequence and return its terminal outcome.
    pub async fn call(&self, correlation_id: &CorrelationId) -> CallOutcome {
        let target = self.pipeline.breaker().target();
        tracing::info!(target_name = %target, path = %self.path, "Calling external API");

        let outcome = self
            .pipeline
            .execute(|| {
                self.invoker.get(UpstreamRequest {
                    path: &self.path,
                    timeout: self.attempt_timeout,
                    correlation_id,
                })
            })
            .await;

        match &outcome {
            CallOutcome::Success(status) => {
                tracing::info!(target_name = %target, status = status.as_u16(), "External API responded");
            }
            CallOutcome::TimedOut => {
                tracing::warn!(target_name = %target, "Timeout calling external API");
            }
            CallOutcome::CircuitOpen => {
                tracing::warn!(target_name = %target, "External API call rejected, circuit open");
            }
            CallOutcome::Cancelled => {
                tracing::info!(target_name = %target, "External API call cancelled");
            }
            failure => {
                tracing::error!(target_name = %target, outcome = %failure, "Error calling external API");
            }
        }

        outcome
    }

    /// Run the call and build the response.
    pub async fn respond(&self, correlation_id: &CorrelationId) -> Response {
        let start = Instant::now();
        let outcome = self.call(correlation_id).await;
        metrics::record_request(status_for(&outcome).as_u16(), start);
        outcome_response(&outcome, correlation_id)
    }
}

/// `GET /external`
pub async fn external_handler(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
) -> Response {
    state.handler.respond(&correlation_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{BreakerPhase, InvocationResult, InvokeError};
    use axum::http::StatusCode;
    use futures_util::future::BoxFuture;
    use std::sync::Mutex;

    /// Replays scripted results and records the correlation IDs it saw.
    struct ScriptedInvoker {
        script: Mutex<Vec<InvocationResult>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        fn new(mut script: Vec<InvocationResult>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl UpstreamInvoker for ScriptedInvoker {
        fn get<'a>(&'a self, request: UpstreamRequest<'a>) -> BoxFuture<'a, InvocationResult> {
            self.seen.lock().unwrap().push(request.correlation_id.to_string());
            let next = self.script.lock().unwrap().pop().unwrap_or(Ok(StatusCode::OK));
            Box::pin(async move { next })
        }
    }

    fn handler(invoker: Arc<ScriptedInvoker>) -> ResilientCallHandler {
        let config = GatewayConfig::default();
        let registry = BreakerRegistry::new(config.circuit_breaker.clone());
        ResilientCallHandler::new(&config, &registry, invoker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_carries_correlation_id() {
        let invoker = ScriptedInvoker::new(vec![
            Ok(StatusCode::SERVICE_UNAVAILABLE),
            Err(InvokeError::Connect("reset".into())),
            Ok(StatusCode::OK),
        ]);
        let h = handler(invoker.clone());
        let id = CorrelationId::parse("trace-me").unwrap();

        let response = h.respond(&id).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*invoker.seen.lock().unwrap(), vec!["trace-me"; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_timeouts_surface_as_504() {
        let invoker = ScriptedInvoker::new(vec![Err(InvokeError::Timeout); 3]);
        let h = handler(invoker);
        let response = h.respond(&CorrelationId::generate()).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_call_rejected_without_upstream() {
        let invoker = ScriptedInvoker::new(vec![Ok(StatusCode::INTERNAL_SERVER_ERROR); 5]);
        let mut config = GatewayConfig::default();
        config.retries.enabled = false;
        let registry = BreakerRegistry::new(config.circuit_breaker.clone());
        let h = ResilientCallHandler::new(&config, &registry, invoker.clone());

        for _ in 0..5 {
            let response = h.respond(&CorrelationId::generate()).await;
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
        assert_eq!(h.pipeline().breaker().phase(), BreakerPhase::Open);

        let response = h.respond(&CorrelationId::generate()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(invoker.seen.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let invoker = ScriptedInvoker::new(vec![Ok(StatusCode::NOT_FOUND)]);
        let h = handler(invoker.clone());
        let response = h.respond(&CorrelationId::generate()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(invoker.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_stops_retrying() {
        let invoker = ScriptedInvoker::new(vec![Ok(StatusCode::SERVICE_UNAVAILABLE); 3]);
        let h = handler(invoker.clone());
        let id = CorrelationId::generate();

        // Attempts at 0s and 1s, then dropped during the 2s backoff.
        let dropped = tokio::time::timeout(Duration::from_millis(1500), h.respond(&id)).await;
        assert!(dropped.is_err());
        assert_eq!(invoker.seen.lock().unwrap().len(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(invoker.seen.lock().unwrap().len(), 2);
        let snapshot = h.pipeline().breaker().snapshot();
        assert_eq!(snapshot.phase, BreakerPhase::Closed);
        assert_eq!(snapshot.consecutive_failures, 2);
    }
}
