//! gracehttp demo server.
//!
//! Serves a greeting on the configured address until interrupted, then
//! drains connections within the configured grace period.
//!
//! ```text
//! gracehttp --addr unix:///tmp/gracehttp.sock
//! gracehttp --config server.toml --shutdown-timeout 10
//! ```

use std::path::PathBuf;

use axum::{routing::get, Router};
use clap::Parser;
use tower_http::trace::TraceLayer;

use gracehttp::config::{load_config, ServerConfig};
use gracehttp::observability::init_logging;
use gracehttp::{wait_for_interrupt, ListenContext, Server};

#[derive(Parser)]
#[command(name = "gracehttp")]
#[command(about = "Serve HTTP on any address and shut down gracefully", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration.
    #[arg(short, long)]
    addr: Option<String>,

    /// Grace period for draining connections, in seconds.
    #[arg(long)]
    shutdown_timeout: Option<u64>,

    /// Serve HTTP/1.1 only.
    #[arg(long)]
    no_http2: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(addr) = cli.addr {
        config.address = addr;
    }
    if let Some(secs) = cli.shutdown_timeout {
        config.shutdown_timeout_secs = secs;
    }
    if cli.no_http2 {
        config.force_http2 = false;
    }

    init_logging(&config.logging)?;

    tracing::info!(
        address = %config.address,
        http2 = config.force_http2,
        shutdown_timeout_secs = config.shutdown_timeout_secs,
        "Configuration loaded"
    );

    let server = Server::from_config(&config, app())?;

    let ctx = match config.bind_timeout() {
        Some(timeout) => ListenContext::with_timeout(timeout),
        None => ListenContext::new(),
    };
    server.listen_and_serve_async(&ctx).await?;

    let interrupt = wait_for_interrupt().await;
    tracing::info!(signal = %interrupt, "Shutdown signal received");

    if let Err(e) = server.shutdown_timeout(config.shutdown_timeout()).await {
        tracing::warn!(error = %e, "Graceful shutdown incomplete");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn app() -> Router {
    Router::new()
        .route("/", get(|| async { "Hello, 世界" }))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
}
