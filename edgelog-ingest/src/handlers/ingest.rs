//! `POST /internal/logging`: persist one log record.
//!
//! Logging is best-effort, so only a broken sink is reported as a failure.
//! Empty bodies (health checks on the same route) and malformed payloads are
//! acknowledged with success and leave the sink untouched; the latter are
//! reported server-side only.

use crate::server::IngestState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::Json;
use edgelog_core::LogRecord;
use edgelog_observability::metrics::IngestOutcome;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

pub async fn ingest_record(
    State(state): State<Arc<IngestState>>,
    request: Request,
) -> (StatusCode, Json<Value>) {
    let body = match axum::body::to_bytes(request.into_body(), state.max_record_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, limit = state.max_record_bytes, "Unreadable log payload, ignoring");
            state.metrics.record_ingest(IngestOutcome::Malformed);
            return acknowledged();
        }
    };

    if body.iter().all(u8::is_ascii_whitespace) {
        state.metrics.record_ingest(IngestOutcome::Empty);
        return acknowledged();
    }

    let record: LogRecord = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Malformed log payload, ignoring");
            state.metrics.record_ingest(IngestOutcome::Malformed);
            return acknowledged();
        }
    };

    let line = match record.to_json_line() {
        Ok(line) => line,
        Err(e) => {
            error!(error = %e, "Failed to serialize log record");
            state.metrics.record_ingest(IngestOutcome::Failed);
            return failed();
        }
    };

    let sink = Arc::clone(&state.sink);
    let started = Instant::now();
    let appended = tokio::task::spawn_blocking(move || sink.append(&line)).await;

    match appended {
        Ok(Ok(())) => {
            state.metrics.observe_append(started.elapsed().as_secs_f64());
            state.metrics.record_ingest(IngestOutcome::Appended);
            debug!(method = record.method(), pathname = record.pathname(), "Log record persisted");
            acknowledged()
        }
        Ok(Err(e)) if !e.is_persistence_fault() => {
            warn!(error = %e, "Sink rejected log record, ignoring");
            state.metrics.record_ingest(IngestOutcome::Malformed);
            acknowledged()
        }
        Ok(Err(e)) => {
            error!(error = %e, sink = %state.sink.describe().path, "Failed to persist log record");
            state.metrics.record_ingest(IngestOutcome::Failed);
            failed()
        }
        Err(e) => {
            error!(error = %e, "Log append task panicked");
            state.metrics.record_ingest(IngestOutcome::Failed);
            failed()
        }
    }
}

fn acknowledged() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "success": true })))
}

fn failed() -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "success": false })))
}
