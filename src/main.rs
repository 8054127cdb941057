use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use pylon::config::ConfigStore;
use pylon::lifecycle::{Lifecycle, LifecycleOptions};
use pylon::observability;

/// Identity-aware reverse proxy.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the configuration document.
    #[arg(long, default_value = "/config/config.json")]
    config: PathBuf,

    /// Admin listener (frontend + /config editor); survives reloads.
    #[arg(long, default_value = "0.0.0.0:3001")]
    admin_addr: SocketAddr,

    /// Static files served by the admin listener.
    #[arg(long, default_value = "frontend")]
    frontend_dir: PathBuf,

    /// Certificate disk cache.
    #[arg(long, default_value = "/certs")]
    cert_dir: PathBuf,

    /// Use the ACME staging directory instead of production.
    #[arg(long)]
    acme_staging: bool,

    /// Prometheus scrape listener; metrics are off when unset.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::logging::init();
    let cli = Cli::parse();

    tracing::info!(
        config = %cli.config.display(),
        admin_addr = %cli.admin_addr,
        "pylon starting"
    );

    if let Some(addr) = cli.metrics_addr {
        observability::metrics::init_metrics(addr);
    }

    // A missing or malformed document at startup is fatal.
    let store = ConfigStore::new(cli.config);
    let lifecycle = Lifecycle::start(
        store,
        LifecycleOptions {
            cert_dir: cli.cert_dir,
            acme_production: !cli.acme_staging,
        },
    )
    .await?;

    let admin = pylon::admin::router(lifecycle.clone(), cli.frontend_dir);
    let listener = TcpListener::bind(cli.admin_addr).await?;
    tracing::info!(address = %cli.admin_addr, "admin listener started");

    axum::serve(listener, admin)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lifecycle.stop().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
