//! Order lifecycle service.
//!
//! Wires the coordinator to its collaborators, supervises the background
//! sweeps and exposes `/health` and `/metrics`.

pub mod config;
pub mod error;
pub mod routes;
pub mod sink;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use coordinator::{
    EventPublisher, InMemoryCartService, InMemoryCompensationLog, InMemoryPaymentService,
    InMemoryProductService, MetricsReconciler, OrderLifecycleCoordinator,
    PrometheusMetricsRecorder, SweepJob, TimeoutSweeper,
};
use lock::{CoordinationStore, LockCoordinator};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::InMemoryOrderRepository;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::{Result, ServerError};
use crate::sink::TracingEventSink;

pub type ServiceCoordinator = OrderLifecycleCoordinator<
    InMemoryOrderRepository,
    InMemoryProductService,
    InMemoryCartService,
    InMemoryPaymentService,
>;

/// Everything the binary runs.
pub struct Services {
    pub coordinator: Arc<ServiceCoordinator>,
    pub repository: InMemoryOrderRepository,
    /// Shares state with the coordinator's product service.
    pub products: InMemoryProductService,
    pub recorder: PrometheusMetricsRecorder,
}

impl Services {
    /// Builds the coordinator over in-memory collaborators and the given
    /// coordination store.
    pub fn build(config: &Config, store: Arc<dyn CoordinationStore>) -> Self {
        let coordinator_config = config.coordinator_config();
        let repository = InMemoryOrderRepository::new();
        let products = InMemoryProductService::new();
        let recorder = PrometheusMetricsRecorder::new();

        let locks = LockCoordinator::new(store, config.lock_config());
        let publisher = EventPublisher::new(
            Arc::new(TracingEventSink),
            coordinator_config.event_publish_timeout,
        );

        let coordinator = OrderLifecycleCoordinator::new(
            repository.clone(),
            products.clone(),
            InMemoryCartService::new(),
            InMemoryPaymentService::new(),
            locks,
            publisher,
            coordinator_config,
        )
        .with_metrics(Arc::new(recorder.clone()))
        .with_compensation_log(Arc::new(InMemoryCompensationLog::new()));

        Self {
            coordinator: Arc::new(coordinator),
            repository,
            products,
            recorder,
        }
    }

    /// Starts each sweep job and the metrics reconciler as separate tasks.
    /// All of them stop once `shutdown` is cancelled.
    pub fn spawn_background(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let sweeper = TimeoutSweeper::new(self.coordinator.clone());
        let reconciler = MetricsReconciler::new(
            self.repository.clone(),
            Arc::new(self.recorder.clone()),
            self.coordinator.config().metrics_reconcile_interval,
        );

        let mut tasks: Vec<JoinHandle<()>> = SweepJob::ALL
            .into_iter()
            .map(|job| {
                let sweeper = sweeper.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { sweeper.run_job(job, shutdown).await })
            })
            .collect();

        let reconciler_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move { reconciler.run(reconciler_shutdown).await }));
        tasks
    }
}

/// Creates the Axum router for the operational endpoints.
pub fn create_app(recorder: PrometheusMetricsRecorder, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(recorder)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Installs the global subscriber with the configured filter and format.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| ServerError::LogFilter(e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
    Ok(())
}
