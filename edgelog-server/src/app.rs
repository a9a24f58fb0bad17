use axum::Router;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use chrono::Utc;
use edgelog_core::EdgelogConfig;
use edgelog_core::record::format_timestamp;
use edgelog_ingest::{IngestState, build_ingest_router};
use edgelog_interceptor::forwarder::ForwarderConfig;
use edgelog_interceptor::{ForwarderTask, HttpTransport, Interceptor, LogForwarder};
use edgelog_observability::{PipelineMetrics, Sink, sink};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything `serve` needs to run and later stop the pipeline.
pub struct Pipeline {
    pub router: Router,
    pub sink: Arc<dyn Sink>,
    pub forwarder: Option<ForwarderTask>,
}

/// Wire sink, ingestion endpoint, forwarder and interceptor around the demo
/// application. `bound` is the listener's actual address. Must be called
/// inside a tokio runtime.
pub fn build(config: &EdgelogConfig, bound: SocketAddr) -> anyhow::Result<Pipeline> {
    let metrics = Arc::new(PipelineMetrics::new(
        config.observability.prometheus.enabled,
    )?);

    let sink = sink::from_config(&config.sink);
    let state = Arc::new(IngestState::new(
        Arc::clone(&sink),
        Arc::clone(&metrics),
        config.ingest.max_record_bytes,
    ));
    let router = demo_router().merge(build_ingest_router(config, state));

    if !config.interceptor.enabled {
        info!("Interceptor disabled, requests are not logged");
        return Ok(Pipeline {
            router,
            sink,
            forwarder: None,
        });
    }

    let transport = HttpTransport::new(
        config.forward_url(bound),
        Duration::from_millis(config.interceptor.timeout_ms),
    )?;
    info!(forward_url = transport.url(), "Log forwarder target");
    let (forwarder, task) = LogForwarder::spawn(
        ForwarderConfig::from(&config.interceptor),
        transport,
        metrics,
    );
    let interceptor = Interceptor::from_config(config, forwarder)?;
    info!(
        queue_capacity = config.interceptor.queue_capacity,
        max_in_flight = config.interceptor.max_in_flight,
        "Interceptor enabled"
    );

    Ok(Pipeline {
        router: interceptor.wrap(router),
        sink,
        forwarder: Some(task),
    })
}

/// Stand-in application whose requests get logged. `/api/log/error` fails
/// on purpose; its 500 reaches the client untouched and is still logged.
pub fn demo_router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/log/basic", get(log_basic))
        .route("/api/log/info", get(log_info))
        .route("/api/log/error", get(log_error))
}

async fn index() -> &'static str {
    "edgelog demo application\n"
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "edgelog",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn log_basic() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "Basic log endpoint called",
        "timestamp": format_timestamp(Utc::now()),
    }))
}

async fn log_info() -> Json<Value> {
    Json(json!({
        "status": "info",
        "message": "Information log entry",
        "details": { "apiVersion": env!("CARGO_PKG_VERSION") },
        "timestamp": format_timestamp(Utc::now()),
    }))
}

async fn log_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "message": "Intentionally failed request",
            "errorCode": "DEMO_ERROR_500",
            "timestamp": format_timestamp(Utc::now()),
        })),
    )
}
