//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call sequence for one inbound request:
//!     → retries.rs (outer loop, backoff between transient failures)
//!     → circuit_breaker.rs (admit, reject fast, or elect the half-open probe)
//!     → timeouts.rs (per-attempt deadline)
//!     → classifier.rs (raw result → CallOutcome)
//!     → outcome flows back to the handler unchanged
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream attempt has a deadline
//! - Retry wraps the breaker, never the other way round
//! - Breaker state is per target and lives in `registry.rs`
//! - Cancellation is failure-neutral

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod outcome;
pub mod pipeline;
pub mod registry;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerPermit, BreakerPhase, BreakerSnapshot, CircuitBreaker, CircuitOpenError};
pub use classifier::classify;
pub use outcome::{CallOutcome, FailureReason, InvocationResult, InvokeError};
pub use pipeline::PolicyPipeline;
pub use registry::BreakerRegistry;
pub use retries::{RetryPolicy, RetryState};
