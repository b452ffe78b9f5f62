//! Resilience gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ inbound limiter ──▶ /proxy/{upstream}/{*path}
//!                                              │
//!                                              ▼
//!                     ┌──────────────── PolicyExecutor ────────────────┐
//!                     │  rate limiter ─▶ circuit breaker ─▶ upstream   │──── Upstream
//!                     │        ▲                                 │     │
//!                     │        └──────── retry policy ◀──────────┘     │
//!                     └────────────────────────────────────────────────┘
//!                                              │
//!     Client Response ◀──── outcome → status ◀─┘
//! ```

use std::path::PathBuf;
use clap::Parser;
use tokio::net::TcpListener;

use resilience_engine::config::{load_config, EngineConfig};
use resilience_engine::http::{shutdown_signal, HttpServer};
use resilience_engine::observability::{logging::init_logging, metrics::init_metrics};

#[derive(Parser)]
#[command(name = "resilience-engine")]
#[command(about = "HTTP gateway guarding upstreams with rate limits, circuit breakers and retries", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilience-engine starting");

    tracing::info!(
        bind_address = %config.server.bind_address,
        request_timeout_secs = config.server.request_timeout_secs,
        upstreams = config.upstreams.len(),
        policies = config.policies.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config);
    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
