use anyhow::Context;
use clap::Parser;
use handoff::api::create_coordinator_server;
use handoff::config::Config;
use handoff::metrics::{init_metrics, start_metrics_server};
use handoff::signaling::RoomRegistry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Rendezvous coordinator for peer-to-peer file shares
#[derive(Parser, Debug)]
#[command(name = "handoff-coordinator", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overriding the configured bind address's port
    #[arg(short, long)]
    port: Option<u16>,

    /// Path the signaling websocket is served on
    #[arg(long)]
    ws_path: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.coordinator.bind_addr.set_port(port);
    }
    if let Some(ws_path) = args.ws_path {
        config.coordinator.ws_path = ws_path;
    }
    if args.metrics_addr.is_some() {
        config.coordinator.metrics_addr = args.metrics_addr;
    }
    config.validate().context("invalid configuration")?;

    init_metrics();
    if let Some(metrics_addr) = config.coordinator.metrics_addr {
        start_metrics_server(metrics_addr).context("failed to start metrics exporter")?;
    }

    let registry = Arc::new(RoomRegistry::new());
    let app = create_coordinator_server(registry, &config.coordinator);

    let listener = tokio::net::TcpListener::bind(config.coordinator.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.coordinator.bind_addr))?;
    let local_addr = listener.local_addr()?;

    println!("\nHandoff coordinator");
    println!("  Signaling:  ws://{}{}", local_addr, config.coordinator.ws_path);
    println!("  Health:     http://{}/health", local_addr);
    println!("  Stats:      http://{}/api/v1/stats", local_addr);
    if let Some(metrics_addr) = config.coordinator.metrics_addr {
        println!("  Metrics:    http://{}/metrics", metrics_addr);
    }
    println!();
    tracing::info!(%local_addr, ws_path = %config.coordinator.ws_path, "coordinator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("coordinator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
