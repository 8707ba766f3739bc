//! Resilient upstream gateway library.
//!
//! Mediates calls to an unreliable upstream: retry with exponential backoff
//! around a per-target circuit breaker, with a correlation ID tying each
//! inbound request to every attempt and log line.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
