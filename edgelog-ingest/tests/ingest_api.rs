//! Integration tests for the ingestion endpoint.
//!
//! Uses `tower::ServiceExt::oneshot` to call handlers without binding a real
//! TCP port. Every test gets a fresh sink in its own temp directory.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use edgelog_core::{EdgelogConfig, LogRecord};
use edgelog_ingest::{IngestState, build_ingest_router};
use edgelog_observability::sink::{FileSink, FileSinkConfig};
use edgelog_observability::{PipelineMetrics, Sink};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tower::ServiceExt; // .oneshot()

const SAMPLE: &str = r#"{"method":"GET","origin":"https://example.com","pathname":"/api/samples","headers":{"accept":"application/json"},"timestamp":"2024-01-01T00:00:00.000Z"}"#;

// ── Helper ────────────────────────────────────────────────────

struct Fixture {
    _dir: tempfile::TempDir,
    path: PathBuf,
    router: Router,
    metrics: Arc<PipelineMetrics>,
}

fn fixture_with(config: EdgelogConfig, sink_path: Option<PathBuf>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = sink_path.unwrap_or_else(|| dir.path().join("logs").join("access.log"));
    let sink: Arc<dyn Sink> = Arc::new(FileSink::new(FileSinkConfig {
        file_path: path.clone(),
        max_file_size_bytes: 0,
        max_rotated_files: 0,
    }));
    let metrics = Arc::new(PipelineMetrics::new(true).unwrap());
    let state = Arc::new(IngestState::new(
        sink,
        Arc::clone(&metrics),
        config.ingest.max_record_bytes,
    ));
    Fixture {
        router: build_ingest_router(&config, state),
        _dir: dir,
        path,
        metrics,
    }
}

fn fixture() -> Fixture {
    fixture_with(EdgelogConfig::default(), None)
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/internal/logging")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn sink_lines(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => content.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

fn ingest_count(f: &Fixture, outcome: &str) -> u64 {
    f.metrics
        .ingested_total
        .as_ref()
        .unwrap()
        .with_label_values(&[outcome])
        .get()
}

// ── Persistence ───────────────────────────────────────────────

#[tokio::test]
async fn sample_record_is_appended_once() {
    let f = fixture();
    let resp = f.router.clone().oneshot(post(SAMPLE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!({ "success": true }));

    let lines = sink_lines(&f.path);
    assert_eq!(lines.len(), 1);
    let written: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    let sent: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
    assert_eq!(written, sent);
    assert_eq!(ingest_count(&f, "appended"), 1);
}

#[tokio::test]
async fn sink_file_is_created_lazily() {
    let f = fixture();
    assert!(!f.path.exists());
    f.router.clone().oneshot(post(SAMPLE)).await.unwrap();
    assert!(f.path.exists());
}

#[tokio::test]
async fn hundred_concurrent_posts_yield_hundred_distinct_lines() {
    let f = fixture();
    let mut set = JoinSet::new();
    for i in 0..100 {
        let router = f.router.clone();
        set.spawn(async move {
            let record = LogRecord::capture(
                "GET",
                "https://example.com",
                format!("/api/samples/{i}"),
                vec![("accept", "application/json")],
            )
            .unwrap();
            let body = serde_json::to_string(&record).unwrap();
            router.oneshot(post(body)).await.unwrap().status()
        });
    }
    while let Some(status) = set.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    let lines = sink_lines(&f.path);
    assert_eq!(lines.len(), 100);
    let mut paths: Vec<String> = lines
        .iter()
        .map(|l| serde_json::from_str::<LogRecord>(l).unwrap().pathname().to_string())
        .collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 100);
}

#[tokio::test]
async fn persistence_failure_returns_500() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"").unwrap();
    let f = fixture_with(EdgelogConfig::default(), Some(blocker.join("access.log")));

    let resp = f.router.clone().oneshot(post(SAMPLE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(resp).await, serde_json::json!({ "success": false }));
    assert_eq!(ingest_count(&f, "failed"), 1);
}

// ── No-op and malformed ───────────────────────────────────────

#[tokio::test]
async fn empty_body_is_acknowledged_without_writing() {
    let f = fixture();
    f.router.clone().oneshot(post(SAMPLE)).await.unwrap();

    for body in ["", "   \n"] {
        let resp = f.router.clone().oneshot(post(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["success"], true);
    }

    assert_eq!(sink_lines(&f.path).len(), 1);
    assert_eq!(ingest_count(&f, "empty"), 2);
}

#[tokio::test]
async fn empty_body_does_not_create_sink() {
    let f = fixture();
    let resp = f.router.clone().oneshot(post(Body::empty())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!f.path.exists());
}

#[tokio::test]
async fn malformed_payloads_are_acknowledged_and_dropped() {
    let f = fixture();
    let bad = [
        "{not json",
        "[1,2,3]",
        r#"{"method":"GET"}"#,
        r#"{"method":"","pathname":"/","timestamp":"2024-01-01T00:00:00.000Z"}"#,
        r#"{"method":"GET","pathname":"/","timestamp":"not-a-time"}"#,
    ];
    for body in bad {
        let resp = f.router.clone().oneshot(post(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "payload {body:?}");
        assert_eq!(body_json(resp).await["success"], true);
    }

    assert!(sink_lines(&f.path).is_empty());
    assert_eq!(ingest_count(&f, "malformed"), bad.len() as u64);

    // Handler still works afterwards.
    let resp = f.router.clone().oneshot(post(SAMPLE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(sink_lines(&f.path).len(), 1);
}

#[tokio::test]
async fn oversized_payload_is_treated_as_malformed() {
    let mut config = EdgelogConfig::default();
    config.ingest.max_record_bytes = 64;
    let f = fixture_with(config, None);

    let resp = f.router.clone().oneshot(post(SAMPLE)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(sink_lines(&f.path).is_empty());
    assert_eq!(ingest_count(&f, "malformed"), 1);
}

// ── Health & metrics ──────────────────────────────────────────

#[tokio::test]
async fn health_reports_sink_state() {
    let f = fixture();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = f.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sink"]["kind"], "file");
    assert_eq!(json["sink"]["exists"], false);

    f.router.clone().oneshot(post(SAMPLE)).await.unwrap();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let json = body_json(f.router.clone().oneshot(req).await.unwrap()).await;
    assert_eq!(json["sink"]["exists"], true);
}

#[tokio::test]
async fn metrics_route_only_when_enabled() {
    let f = fixture();
    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = f.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mut config = EdgelogConfig::default();
    config.observability.prometheus.enabled = true;
    let f = fixture_with(config, None);
    f.router.clone().oneshot(post(SAMPLE)).await.unwrap();
    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = f.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("edgelog_ingested_records_total"));
}

#[tokio::test]
async fn get_on_ingest_path_is_not_allowed() {
    let f = fixture();
    let req = Request::builder()
        .uri("/internal/logging")
        .body(Body::empty())
        .unwrap();
    let resp = f.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}
