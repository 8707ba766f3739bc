//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds >= 1)
//! - Check the inbound deadline covers the worst-case call sequence
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::resilience::backoff::total_backoff;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("upstream.base_url '{url}' is invalid: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("upstream.name must not be empty")]
    EmptyTargetName,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("retries.base_delay_ms ({base}) exceeds retries.max_delay_ms ({max})")]
    BackoffRange { base: u64, max: u64 },

    #[error("retries.jitter_ratio must be within [0, 1]")]
    JitterRange,

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("worst-case call sequence overflows (upstream.timeout_secs x retries.max_attempts + backoff)")]
    SequenceOverflow,

    #[error("timeouts.request_secs ({request_secs}s) is shorter than the worst-case call sequence ({worst_case_secs}s)")]
    InboundDeadlineTooShort { request_secs: u64, worst_case_secs: u64 },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.upstream.name.trim().is_empty() {
        errors.push(ValidationError::EmptyTargetName);
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::InvalidBaseUrl {
            url: config.upstream.base_url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError::InvalidBaseUrl {
            url: config.upstream.base_url.clone(),
            reason: e.to_string(),
        }),
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.timeout_secs"));
    }
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::Zero("circuit_breaker.failure_threshold"));
    }
    if config.circuit_breaker.break_duration_secs == 0 {
        errors.push(ValidationError::Zero("circuit_breaker.break_duration_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    let retries = &config.retries;
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::BackoffRange {
            base: retries.base_delay_ms,
            max: retries.max_delay_ms,
        });
    }
    if !(0.0..=1.0).contains(&retries.jitter_ratio) {
        errors.push(ValidationError::JitterRange);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    match worst_case_sequence(config) {
        Some(worst_case)
            if config.timeouts.request_secs > 0
                && Duration::from_secs(config.timeouts.request_secs) <= worst_case =>
        {
            errors.push(ValidationError::InboundDeadlineTooShort {
                request_secs: config.timeouts.request_secs,
                worst_case_secs: worst_case.as_secs_f64().ceil() as u64,
            });
        }
        Some(_) => {}
        None => errors.push(ValidationError::SequenceOverflow),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `max_attempts × per-attempt timeout + Σ backoff`, with jitter headroom.
///
/// `None` when the total does not fit in a `Duration`.
pub fn worst_case_sequence(config: &GatewayConfig) -> Option<Duration> {
    let retries = &config.retries;
    let attempts = if retries.enabled { retries.max_attempts.max(1) } else { 1 };

    let backoff = if retries.enabled {
        let total = total_backoff(
            retries.max_attempts,
            Duration::from_millis(retries.base_delay_ms),
            Duration::from_millis(retries.max_delay_ms),
        )?;
        let headroom = 1.0 + retries.jitter_ratio.clamp(0.0, 1.0);
        Duration::try_from_secs_f64(total.as_secs_f64() * headroom).ok()?
    } else {
        Duration::ZERO
    };

    config
        .upstream
        .timeout()
        .checked_mul(attempts)?
        .checked_add(backoff)
}
