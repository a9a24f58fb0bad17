use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// What the ingestion endpoint did with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Appended,
    Empty,
    Malformed,
    Failed,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Appended => "appended",
            IngestOutcome::Empty => "empty",
            IngestOutcome::Malformed => "malformed",
            IngestOutcome::Failed => "failed",
        }
    }
}

/// What happened to one record handed to the forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    Failed,
    Dropped,
}

impl ForwardOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardOutcome::Delivered => "delivered",
            ForwardOutcome::Failed => "failed",
            ForwardOutcome::Dropped => "dropped",
        }
    }
}

/// Pipeline metrics, all gated behind `enabled`.
///
/// When disabled no registry is created and every `record_*` call returns
/// immediately, so the interceptor hot path pays nothing.
pub struct PipelineMetrics {
    enabled: bool,
    registry: Option<Registry>,
    pub ingested_total: Option<IntCounterVec>,
    pub forwarded_total: Option<IntCounterVec>,
    pub append_duration: Option<Histogram>,
    pub forward_queue_depth: Option<IntGauge>,
}

impl PipelineMetrics {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let ingested_total = IntCounterVec::new(
            Opts::new("ingested_records_total", "Records received by the ingestion endpoint")
                .namespace("edgelog"),
            &["outcome"],
        )?;

        let forwarded_total = IntCounterVec::new(
            Opts::new("forwarded_records_total", "Records handled by the interceptor forwarder")
                .namespace("edgelog"),
            &["outcome"],
        )?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new("sink_append_duration_seconds", "Sink append latency")
                .namespace("edgelog")
                .buckets(vec![
                    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0,
                ]),
        )?;

        let forward_queue_depth = IntGauge::with_opts(
            Opts::new("forward_queue_depth", "Records waiting in the forwarder queue")
                .namespace("edgelog"),
        )?;

        registry.register(Box::new(ingested_total.clone()))?;
        registry.register(Box::new(forwarded_total.clone()))?;
        registry.register(Box::new(append_duration.clone()))?;
        registry.register(Box::new(forward_queue_depth.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            ingested_total: Some(ingested_total),
            forwarded_total: Some(forwarded_total),
            append_duration: Some(append_duration),
            forward_queue_depth: Some(forward_queue_depth),
        })
    }

    /// No-op collector.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            ingested_total: None,
            forwarded_total: None,
            append_duration: None,
            forward_queue_depth: None,
        }
    }

    #[inline]
    pub fn record_ingest(&self, outcome: IngestOutcome) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.ingested_total {
            counter.with_label_values(&[outcome.as_str()]).inc();
        }
    }

    #[inline]
    pub fn record_forward(&self, outcome: ForwardOutcome) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.forwarded_total {
            counter.with_label_values(&[outcome.as_str()]).inc();
        }
    }

    #[inline]
    pub fn observe_append(&self, duration_secs: f64) {
        if let Some(ref hist) = self.append_duration {
            hist.observe(duration_secs);
        }
    }

    #[inline]
    pub fn set_queue_depth(&self, depth: usize) {
        if let Some(ref gauge) = self.forward_queue_depth {
            gauge.set(depth as i64);
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        if let Some(ref registry) = self.registry {
            let encoder = TextEncoder::new();
            let metric_families = registry.gather();
            let mut buffer = Vec::new();
            encoder.encode(&metric_families, &mut buffer).unwrap_or(());
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
