//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (attach/derive correlation ID, open request span)
//!     → external.rs (run the policy pipeline against the upstream)
//!     → response.rs (outcome → status / problem body)
//!     → Send to client with X-Correlation-ID
//! ```

pub mod external;
pub mod request;
pub mod response;
pub mod server;

pub use external::ResilientCallHandler;
pub use request::{CorrelationId, X_CORRELATION_ID};
pub use server::{AppState, GatewayServer};
