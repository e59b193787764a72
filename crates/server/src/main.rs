//! liteproxy entry point.
//!
//! Boots the failover proxy: loads configuration, opens the cache store,
//! starts the upstream health monitor and serves HTTP until Ctrl+C.
//! Logs are JSON on stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use liteproxy_client::{HealthMonitor, UpstreamClient, UpstreamProber};
use liteproxy_core::{AppConfig, CacheManager, cache};
use liteproxy_server::{AppState, build_app};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    if let Err(e) = run().await {
        let message = format!("{e:#}");
        tracing::error!(error = %message, "liteproxy failed");
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    let addr = config.socket_addr()?;

    let store = cache::open_store(&config.cache).await.context("opening cache store")?;
    let cache = CacheManager::new(store);

    let client = UpstreamClient::new(&config).context("building upstream client")?;
    let prober = Arc::new(UpstreamProber::new(client.clone(), &config.health));
    let monitor = Arc::new(HealthMonitor::new(prober, &config.health));
    let probe_task = monitor.spawn();

    let app = build_app(AppState::new(&config, client, cache, monitor));

    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, remote_url = %config.remote_url, "liteproxy listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    probe_task.abort();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
