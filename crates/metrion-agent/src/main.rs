mod config;
mod pool;
mod shipper;
mod transport;

use anyhow::Result;
use config::{AgentConfig, TransportKind};
use metrion_collector::Collection;
use metrion_common::crypto::BodyEncryptor;
use pool::{PoolConfig, SendPool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use transport::{GrpcTransport, HttpTransport, Transport};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("metrion=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = AgentConfig::load(&config_path)?;

    tracing::info!(
        server = %config.server_url,
        transport = ?config.transport,
        poll_secs = config.poll_interval_secs,
        report_secs = config.report_interval_secs,
        workers = config.rate_limit,
        "metrion-agent starting"
    );

    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Http => Arc::new(HttpTransport::new()?),
        TransportKind::Grpc => Arc::new(GrpcTransport::new()),
    };

    let encryptor = match &config.crypto_key {
        Some(path) => Some(Arc::new(BodyEncryptor::from_pem_file(Path::new(path))?)),
        None => None,
    };

    let pool = Arc::new(SendPool::new(PoolConfig {
        workers: config.rate_limit,
        server_url: config.server_url.clone(),
        hash_key: config.hash_key.clone(),
        encryptor,
        transport: Some(transport),
    })?);

    let collection = Arc::new(Collection::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = tokio::spawn(shipper::run_poll_loop(
        collection.clone(),
        Duration::from_secs(config.poll_interval_secs),
        shutdown_rx.clone(),
    ));
    let reporter = tokio::spawn(shipper::run_report_loop(
        collection.clone(),
        pool.clone(),
        Duration::from_secs(config.report_interval_secs),
        shutdown_rx.clone(),
    ));

    signal::ctrl_c().await?;
    tracing::info!("shutting down gracefully");
    let _ = shutdown_tx.send(true);

    // the reporter flushes its final batch before the pool closes
    let _ = reporter.await;
    let _ = poller.await;
    pool.close().await;

    tracing::info!("agent stopped");
    Ok(())
}
