use anyhow::Result;
use ipnet::IpNet;
use metrion_common::crypto::BodyDecryptor;
use metrion_common::proto::metrics_service_server::MetricsServiceServer;
use metrion_server::config::ServerConfig;
use metrion_server::state::AppState;
use metrion_server::{app, grpc};
use metrion_storage::db::DbSink;
use metrion_storage::file::FileSink;
use metrion_storage::sink::Sink;
use metrion_storage::{run_flush_loop, LayeredStorage, SyncStorage};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("metrion={}", config.log_level).parse()?),
        )
        .init();

    tracing::info!(
        http = %config.address,
        grpc = %config.grpc_address,
        store_interval = config.store_interval_secs,
        restore = config.restore,
        "metrion-server starting"
    );

    let sync_mode = config.is_sync_mode();
    let sink: Option<Arc<dyn Sink>> = match (&config.database_dsn, &config.file_storage_path) {
        (Some(dsn), _) if !dsn.is_empty() => {
            tracing::info!(dsn = %dsn, "using database back-end");
            Some(Arc::new(DbSink::open(Path::new(dsn))?))
        }
        (_, Some(path)) if !path.is_empty() => {
            tracing::info!(path = %path, "using snapshot-file back-end");
            Some(Arc::new(FileSink::new(path)))
        }
        _ => {
            tracing::info!("no durable back-end configured, running in-memory only");
            None
        }
    };

    let storage: Arc<LayeredStorage> = match sink {
        Some(sink) => Arc::new(LayeredStorage::open(sink, sync_mode, config.restore).await?),
        None => Arc::new(LayeredStorage::memory()),
    };

    let mut state = AppState::new(storage.clone());
    if let Some(key) = config.hash_key.as_deref().filter(|k| !k.is_empty()) {
        state = state.with_hash_key(key);
    }
    if let Some(path) = config.crypto_key.as_deref().filter(|p| !p.is_empty()) {
        let decryptor = BodyDecryptor::from_pem_file(Path::new(path))?;
        state = state.with_decryptor(Arc::new(decryptor));
    }
    if let Some(cidr) = config.trusted_subnet.as_deref().filter(|s| !s.is_empty()) {
        let subnet: IpNet = cidr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid trusted_subnet '{cidr}': {e}"))?;
        state = state.with_trusted_subnet(subnet);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let flush_handle = if !sync_mode {
        Some(tokio::spawn(run_flush_loop(
            storage.clone() as Arc<dyn SyncStorage>,
            Duration::from_secs(config.store_interval_secs),
            shutdown_rx.clone(),
        )))
    } else {
        None
    };

    // HTTP server
    let http_addr: SocketAddr = config.address.parse()?;
    let http_app = app::build_http_app(state.clone());
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_shutdown = shutdown_rx.clone();
    let http_handle = tokio::spawn(async move {
        let server = axum::serve(http_listener, http_app)
            .with_graceful_shutdown(wait_for_shutdown(http_shutdown));
        if let Err(e) = server.await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // gRPC server
    let grpc_addr: SocketAddr = config.grpc_address.parse()?;
    let grpc_service = MetricsServiceServer::new(grpc::MetricsServiceImpl::new(state.clone()));
    let grpc_shutdown = shutdown_rx.clone();
    let grpc_handle = tokio::spawn(async move {
        let server = TonicServer::builder()
            .add_service(grpc_service)
            .serve_with_shutdown(grpc_addr, wait_for_shutdown(grpc_shutdown));
        if let Err(e) = server.await {
            tracing::error!(error = %e, "gRPC server error");
        }
    });

    tracing::info!(http = %http_addr, grpc = %grpc_addr, "server started");

    signal::ctrl_c().await?;
    tracing::info!("shutting down gracefully");
    let _ = shutdown_tx.send(true);

    let _ = http_handle.await;
    let _ = grpc_handle.await;
    if let Some(handle) = flush_handle {
        let _ = handle.await;
    }
    if let Err(e) = storage.flush_and_close().await {
        tracing::error!(error = %e, "final flush failed");
    }

    tracing::info!("server stopped");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.changed().await;
}
