use crate::handlers;
use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use edgelog_core::EdgelogConfig;
use edgelog_core::config::HEALTH_PATH;
use edgelog_observability::{PipelineMetrics, Sink};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for the ingestion endpoint.
pub struct IngestState {
    pub sink: Arc<dyn Sink>,
    pub metrics: Arc<PipelineMetrics>,
    /// Bodies above this size are treated as malformed.
    pub max_record_bytes: usize,
}

impl IngestState {
    pub fn new(sink: Arc<dyn Sink>, metrics: Arc<PipelineMetrics>, max_record_bytes: usize) -> Self {
        Self {
            sink,
            metrics,
            max_record_bytes,
        }
    }
}

/// Build the ingestion router: the reserved logging path, `/health`, and the
/// prometheus endpoint when metrics are enabled.
pub fn build_ingest_router(config: &EdgelogConfig, state: Arc<IngestState>) -> Router {
    let mut router = Router::new()
        .route(&config.ingest.path, post(handlers::ingest::ingest_record))
        .route(HEALTH_PATH, get(handlers::health::health_check));

    if config.observability.prometheus.enabled {
        router = router.route(&config.observability.prometheus.path, get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Starting HTTP server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Prometheus metrics endpoint handler.
async fn metrics_handler(State(state): State<Arc<IngestState>>) -> String {
    state.metrics.render()
}
