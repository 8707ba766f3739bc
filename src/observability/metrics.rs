//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound external-call results by status
//! - `gateway_call_duration_seconds` (histogram): call sequence latency
//! - `gateway_upstream_attempts_total` (counter): attempts by target, outcome
//! - `gateway_retries_total` (counter): scheduled retries by target
//! - `gateway_call_sequences_cancelled_total` (counter): abandoned sequences by target
//! - `gateway_breaker_transitions_total` (counter): transitions by target, phase
//! - `gateway_breaker_rejections_total` (counter): fast-fail rejections by target
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is optional and owns its own listener

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

use crate::resilience::circuit_breaker::BreakerPhase;

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("gateway_requests_total", "External-call results by caller-facing status");
    describe_histogram!("gateway_call_duration_seconds", "Call sequence latency");
    describe_counter!("gateway_upstream_attempts_total", "Upstream attempts by outcome");
    describe_counter!("gateway_retries_total", "Scheduled retries");
    describe_counter!(
        "gateway_call_sequences_cancelled_total",
        "Call sequences abandoned before completing"
    );
    describe_counter!("gateway_breaker_transitions_total", "Circuit breaker transitions");
    describe_counter!("gateway_breaker_rejections_total", "Calls rejected by an open circuit");

    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_request(status: u16, start: Instant) {
    counter!("gateway_requests_total", "status" => status.to_string()).increment(1);
    histogram!("gateway_call_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(target: &str, outcome: &'static str) {
    counter!(
        "gateway_upstream_attempts_total",
        "target" => target.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(target: &str) {
    counter!("gateway_retries_total", "target" => target.to_string()).increment(1);
}

pub fn record_cancellation(target: &str) {
    counter!("gateway_call_sequences_cancelled_total", "target" => target.to_string()).increment(1);
}

pub fn record_breaker_transition(target: &str, phase: BreakerPhase) {
    counter!(
        "gateway_breaker_transitions_total",
        "target" => target.to_string(),
        "phase" => phase.as_str()
    )
    .increment(1);
}

pub fn record_breaker_rejection(target: &str) {
    counter!("gateway_breaker_rejections_total", "target" => target.to_string()).increment(1);
}
