//! Request correlation.
//!
//! # Responsibilities
//! - Read `X-Correlation-ID` from the inbound request, or generate a UUID v4
//! - Make the ID available to handlers (request extension / extractor)
//! - Open the request span carrying `correlation_id` for every log line
//! - Echo the ID on the response
//!
//! # Design Decisions
//! - Correlation ID added as early as possible for tracing
//! - Malformed inbound IDs are replaced, never forwarded
//! - The ID is request-scoped; nothing is shared across requests

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the correlation ID in both directions.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

const MAX_CORRELATION_ID_LEN: usize = 128;

/// Opaque, immutable identifier tying one inbound request to its logs,
/// upstream attempts and response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Generate a fresh ID.
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Accept an externally supplied ID if it is non-empty, at most 128 bytes
    /// and visible ASCII.
    pub fn parse(value: &str) -> Option<Self> {
        let valid = !value.is_empty()
            && value.len() <= MAX_CORRELATION_ID_LEN
            && value.bytes().all(|b| b.is_ascii_graphic());
        valid.then(|| Self(Arc::from(value)))
    }

    /// Extract a valid ID from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(X_CORRELATION_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handlers take `CorrelationId` as an argument. Outside the middleware a
/// fresh one is generated.
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CorrelationId>()
            .cloned()
            .unwrap_or_else(CorrelationId::generate))
    }
}

/// Attach or derive the correlation ID and run the rest of the stack inside
/// a span that carries it.
pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id =
        CorrelationId::from_headers(request.headers()).unwrap_or_else(CorrelationId::generate);
    let header_name = HeaderName::from_static(X_CORRELATION_ID);
    let header_value = correlation_id.header_value();

    if let Some(value) = &header_value {
        request.headers_mut().insert(header_name.clone(), value.clone());
    }
    request.extensions_mut().insert(correlation_id.clone());

    let span = tracing::info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(header_name, value);
    }
    response
}
