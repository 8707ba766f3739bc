//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the liveness and external-call handlers
//! - Wire up middleware (tracing, correlation ID, inbound timeout)
//! - Own the breaker registry and the external-call handler
//! - Bind server to listener and shut down gracefully

use axum::{middleware, routing::get, Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::external::{external_handler, ResilientCallHandler};
use crate::http::request::correlation_middleware;
use crate::resilience::{BreakerRegistry, InvokeError};
use crate::upstream::{HttpInvoker, UpstreamInvoker};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<ResilientCallHandler>,
    pub breakers: Arc<BreakerRegistry>,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl GatewayServer {
    /// Create a server calling the configured upstream over HTTP.
    pub fn new(config: GatewayConfig) -> Result<Self, InvokeError> {
        let invoker = HttpInvoker::new(&config.upstream)?;
        Ok(Self::with_invoker(config, Arc::new(invoker)))
    }

    /// Create a server with a custom upstream invoker.
    pub fn with_invoker(config: GatewayConfig, invoker: Arc<dyn UpstreamInvoker>) -> Self {
        let breakers = Arc::new(BreakerRegistry::new(config.circuit_breaker.clone()));
        let handler = Arc::new(ResilientCallHandler::new(&config, &breakers, invoker));

        let state = AppState { handler, breakers };
        let router = Self::build_router(&config, state.clone());

        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/external", get(external_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn(correlation_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// Router for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.state.breakers
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.base_url,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// `GET /health`
async fn health_handler() -> Json<&'static str> {
    Json("OK")
}
