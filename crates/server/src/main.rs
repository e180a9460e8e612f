//! Order service entry point.

use std::sync::Arc;

use lock::{CoordinationStore, InMemoryCoordinationStore};
use server::Services;
use server::config::Config;
use server::error::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(feature = "redis")]
async fn coordination_store(config: &Config) -> Result<Arc<dyn CoordinationStore>> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(lock::RedisCoordinationStore::new(url).await?)),
        None => {
            tracing::warn!("REDIS_URL not set, locks are local to this process");
            Ok(Arc::new(InMemoryCoordinationStore::new()))
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn coordination_store(config: &Config) -> Result<Arc<dyn CoordinationStore>> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL ignored: built without the redis feature");
    }
    Ok(Arc::new(InMemoryCoordinationStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    server::init_tracing(&config)?;

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Wire the coordinator and start the background sweeps
    let store = coordination_store(&config).await?;
    let services = Services::build(&config, store);
    let shutdown = CancellationToken::new();
    let tasks = services.spawn_background(&shutdown);

    // 4. Serve operational endpoints
    let app = server::create_app(services.recorder.clone(), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting order service");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Stop background work; passes in flight run to completion
    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "background task panicked");
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
