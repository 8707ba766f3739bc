//! Upstream invocation.
//!
//! # Responsibilities
//! - Define the capability "GET path P against the upstream with timeout T"
//! - Provide the reqwest-backed implementation used in production
//!
//! # Design Decisions
//! - The resilience core only sees the [`UpstreamInvoker`] trait; transport,
//!   TLS and DNS stay behind it
//! - Only the status code is surfaced; the body is discarded
//! - The correlation ID is always forwarded as `X-Correlation-ID`

use futures_util::future::BoxFuture;
use std::time::Duration;
use url::Url;

use crate::config::UpstreamConfig;
use crate::http::request::{CorrelationId, X_CORRELATION_ID};
use crate::resilience::outcome::{InvocationResult, InvokeError};

/// One outbound GET.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamRequest<'a> {
    pub path: &'a str,
    pub timeout: Duration,
    pub correlation_id: &'a CorrelationId,
}

/// Abstract upstream HTTP capability.
pub trait UpstreamInvoker: Send + Sync {
    fn get<'a>(&'a self, request: UpstreamRequest<'a>) -> BoxFuture<'a, InvocationResult>;
}

/// reqwest-backed invoker bound to one base address.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpInvoker {
    pub fn new(config: &UpstreamConfig) -> Result<Self, InvokeError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| InvokeError::Build(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| InvokeError::Build(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl UpstreamInvoker for HttpInvoker {
    fn get<'a>(&'a self, request: UpstreamRequest<'a>) -> BoxFuture<'a, InvocationResult> {
        Box::pin(async move {
            let url = self
                .base_url
                .join(request.path)
                .map_err(|e| InvokeError::Build(e.to_string()))?;

            let response = self
                .client
                .get(url)
                .timeout(request.timeout)
                .header(X_CORRELATION_ID, request.correlation_id.as_str())
                .send()
                .await
                .map_err(map_reqwest_error)?;

            Ok(response.status())
        })
    }
}

/// Only errors raised before anything reaches the wire are permanent. Refused,
/// reset and closed-before-response connections all surface as `Connect`.
fn map_reqwest_error(error: reqwest::Error) -> InvokeError {
    if error.is_timeout() {
        InvokeError::Timeout
    } else if error.is_builder() {
        InvokeError::Build(error.to_string())
    } else if error.is_redirect() {
        InvokeError::Request(error.to_string())
    } else {
        InvokeError::Connect(error.to_string())
    }
}
