//! Resilient upstream gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                  GATEWAY                          │
//!                     │                                                   │
//!   Client Request    │  ┌─────────────┐    ┌──────────────────────┐     │
//!   ──────────────────┼─▶│ correlation │───▶│ /external handler    │     │
//!                     │  │ middleware  │    └──────────┬───────────┘     │
//!                     │  └─────────────┘               │                  │
//!                     │                                ▼                  │
//!                     │                    ┌──────────────────────┐      │
//!                     │                    │ retry (outer)        │      │
//!                     │                    │  └ breaker (inner)   │      │
//!                     │                    │     └ deadline       │──────┼──▶ Upstream
//!                     │                    └──────────────────────┘      │
//!   Client Response   │                                                   │
//!   ◀─────────────────┼── outcome → status + X-Correlation-ID            │
//!                     └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use resilient_gateway::config::{load_config, GatewayConfig};
use resilient_gateway::lifecycle::{self, Shutdown};
use resilient_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "resilient-gateway", version)]
#[command(about = "Retry and circuit-breaker gateway for an unreliable upstream")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilient-gateway starting");

    let shutdown = Shutdown::new();
    let _signal_task = shutdown.trigger_on_signal();

    lifecycle::start(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
