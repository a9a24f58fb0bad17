//! Background forwarding of captured records to the ingestion endpoint.
//!
//! The interceptor never awaits network I/O. [`LogForwarder::submit`] is a
//! non-blocking `try_send` into a bounded queue; a worker task drains the queue
//! and sends each record through a [`RecordTransport`] with at most
//! `max_in_flight` sends outstanding. When the endpoint is slow the queue fills
//! and further records are dropped with a diagnostic, while request handling
//! carries on unaffected.
//!
//! Every failure (network error, timeout, non-2xx) ends at a `warn!` and a
//! counter. Nothing is retried and nothing is reported back to the request
//! that produced the record.

use async_trait::async_trait;
use edgelog_core::config::InterceptorConfig;
use edgelog_core::{EdgelogError, LogRecord};
use edgelog_observability::metrics::{ForwardOutcome, PipelineMetrics};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

// ── Transport ────────────────────────────────────────────────────────────────

/// Delivers one record to the ingestion endpoint.
#[async_trait]
pub trait RecordTransport: Send + Sync + 'static {
    async fn send(&self, record: &LogRecord) -> Result<(), EdgelogError>;
}

/// POSTs records as JSON with a per-request timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EdgelogError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EdgelogError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RecordTransport for HttpTransport {
    async fn send(&self, record: &LogRecord) -> Result<(), EdgelogError> {
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(record)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EdgelogError::Transport(format!("timed out posting to {}", self.url))
                } else {
                    EdgelogError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(EdgelogError::Transport(format!(
                "ingestion endpoint returned {status}: {body}"
            )))
        }
    }
}

// ── Stats ────────────────────────────────────────────────────────────────────

/// Lifetime counters, independent of whether prometheus metrics are enabled.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderSnapshot {
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl ForwarderStats {
    pub fn snapshot(&self) -> ForwarderSnapshot {
        ForwarderSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

// ── Forwarder ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ForwarderConfig {
    pub queue_capacity: usize,
    pub max_in_flight: usize,
}

impl From<&InterceptorConfig> for ForwarderConfig {
    fn from(config: &InterceptorConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            max_in_flight: config.max_in_flight,
        }
    }
}

/// Cheap-to-clone handle used by the interceptor to enqueue records.
#[derive(Clone)]
pub struct LogForwarder {
    sender: mpsc::Sender<LogRecord>,
    stats: Arc<ForwarderStats>,
    metrics: Arc<PipelineMetrics>,
}

/// Owns the worker task. Call [`ForwarderTask::shutdown`] to drain and stop.
pub struct ForwarderTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LogForwarder {
    /// Start the worker on the current tokio runtime.
    pub fn spawn<T: RecordTransport>(
        config: ForwarderConfig,
        transport: T,
        metrics: Arc<PipelineMetrics>,
    ) -> (LogForwarder, ForwarderTask) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ForwarderStats::default());

        let worker = Worker {
            transport: Arc::new(transport),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            stats: Arc::clone(&stats),
            metrics: Arc::clone(&metrics),
        };
        let handle = tokio::spawn(worker.run(rx, shutdown_rx));

        (
            LogForwarder {
                sender: tx,
                stats,
                metrics,
            },
            ForwarderTask {
                shutdown: shutdown_tx,
                handle,
            },
        )
    }

    /// Enqueue a record without waiting. Drops it if the queue is full or
    /// the worker has stopped.
    pub fn submit(&self, record: LogRecord) {
        match self.sender.try_send(record) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .set_queue_depth(self.sender.max_capacity() - self.sender.capacity());
            }
            Err(TrySendError::Full(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_forward(ForwardOutcome::Dropped);
                warn!(pathname = record.pathname(), "Log forward queue full, dropping record");
            }
            Err(TrySendError::Closed(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_forward(ForwardOutcome::Dropped);
                warn!(pathname = record.pathname(), "Log forwarder stopped, dropping record");
            }
        }
    }

    pub fn stats(&self) -> ForwarderSnapshot {
        self.stats.snapshot()
    }
}

impl ForwarderTask {
    /// Stop accepting records, send everything already queued, and wait for
    /// in-flight sends. Returns `false` if `grace` elapsed first.
    pub async fn shutdown(self, grace: Duration) -> bool {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(grace, self.handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Log forwarder did not drain in time");
                false
            }
        }
    }
}

struct Worker {
    transport: Arc<dyn RecordTransport>,
    permits: Arc<Semaphore>,
    stats: Arc<ForwarderStats>,
    metrics: Arc<PipelineMetrics>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<LogRecord>, mut shutdown: watch::Receiver<bool>) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                maybe = rx.recv() => match maybe {
                    Some(record) => self.dispatch(record, &mut in_flight).await,
                    None => break,
                },
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        rx.close();
        let mut drained = 0usize;
        while let Some(record) = rx.recv().await {
            self.dispatch(record, &mut in_flight).await;
            drained += 1;
        }
        while in_flight.join_next().await.is_some() {}
        self.metrics.set_queue_depth(0);
        info!(drained, "Log forwarder stopped");
    }

    async fn dispatch(&self, record: LogRecord, in_flight: &mut JoinSet<()>) {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };

        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        let metrics = Arc::clone(&self.metrics);

        in_flight.spawn(async move {
            let _permit = permit;
            match transport.send(&record).await {
                Ok(()) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                    metrics.record_forward(ForwardOutcome::Delivered);
                    debug!(pathname = record.pathname(), "Log record forwarded");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    metrics.record_forward(ForwardOutcome::Failed);
                    warn!(
                        error = %e,
                        method = record.method(),
                        pathname = record.pathname(),
                        "Log forwarding failed"
                    );
                }
            }
        });
    }
}
