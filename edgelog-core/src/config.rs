use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::EdgelogError;

/// Route served next to the ingestion endpoint for liveness checks.
pub const HEALTH_PATH: &str = "/health";

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgelogConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub interceptor: InterceptorConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Listener settings for the process hosting the ingestion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    /// How long shutdown waits for queued log records to drain.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

/// Ingestion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Reserved path the endpoint listens on. Never intercepted.
    #[serde(default = "default_ingest_path")]
    pub path: String,
    /// Bodies larger than this are treated as malformed.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Newline-delimited JSON file on local disk.
    File,
    /// One JSON line per record on stdout, for a container log router.
    Stdout,
}

/// Append-only sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_kind")]
    pub kind: SinkKind,
    #[serde(default = "default_sink_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_sink_filename")]
    pub filename: String,
    /// Rotate once the file reaches this size. 0 = never.
    #[serde(default)]
    pub max_file_size_bytes: u64,
    /// Rotated files to keep. 0 = unlimited.
    #[serde(default)]
    pub max_rotated_files: usize,
}

/// Edge interceptor and forwarder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Where records are POSTed. Defaults to this process's own ingest path.
    #[serde(default)]
    pub forward_url: Option<String>,
    /// Extra path patterns that are never logged (`/assets/{*rest}`).
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    #[serde(default = "default_forward_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Header values replaced with `[REDACTED]` at capture time.
    #[serde(default)]
    pub redact_headers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, no prometheus counters are updated on the hot path.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_addr() -> String { "0.0.0.0:3000".into() }
fn default_shutdown_grace() -> u64 { 5000 }
fn default_ingest_path() -> String { "/internal/logging".into() }
fn default_max_record_bytes() -> usize { 64 * 1024 }
fn default_sink_kind() -> SinkKind { SinkKind::File }
fn default_sink_dir() -> PathBuf { PathBuf::from("logs") }
fn default_sink_filename() -> String { "access.log".into() }
fn default_true() -> bool { true }
fn default_forward_timeout() -> u64 { 2000 }
fn default_queue_capacity() -> usize { 10_000 }
fn default_max_in_flight() -> usize { 64 }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            path: default_ingest_path(),
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink_kind(),
            dir: default_sink_dir(),
            filename: default_sink_filename(),
            max_file_size_bytes: 0,
            max_rotated_files: 0,
        }
    }
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            forward_url: None,
            exclude_paths: Vec::new(),
            timeout_ms: default_forward_timeout(),
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
            redact_headers: Vec::new(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl SinkConfig {
    /// Full path of the active sink file.
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }
}

impl EdgelogConfig {
    /// Load configuration from YAML file + env overrides.
    ///
    /// Env keys are prefixed `EDGELOG_` and nested with `__`, e.g.
    /// `EDGELOG_SINK__DIR=/var/log/edgelog`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: EdgelogConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("EDGELOG_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), EdgelogError> {
        self.listen_addr()?;
        if !self.ingest.path.starts_with('/') {
            return Err(EdgelogError::Config(format!(
                "ingest.path must start with '/', got {:?}",
                self.ingest.path
            )));
        }
        if self.ingest.path == HEALTH_PATH {
            return Err(EdgelogError::Config(format!(
                "ingest.path must not be {HEALTH_PATH}"
            )));
        }
        let metrics = &self.observability.prometheus;
        if metrics.enabled {
            if !metrics.path.starts_with('/') {
                return Err(EdgelogError::Config(format!(
                    "observability.prometheus.path must start with '/', got {:?}",
                    metrics.path
                )));
            }
            if metrics.path == self.ingest.path || metrics.path == HEALTH_PATH {
                return Err(EdgelogError::Config(format!(
                    "observability.prometheus.path {:?} collides with another route",
                    metrics.path
                )));
            }
        }
        if self.ingest.max_record_bytes == 0 {
            return Err(EdgelogError::Config("ingest.max_record_bytes must be > 0".into()));
        }
        if self.sink.kind == SinkKind::File && self.sink.filename.trim().is_empty() {
            return Err(EdgelogError::Config("sink.filename must not be empty".into()));
        }
        if self.interceptor.queue_capacity == 0 {
            return Err(EdgelogError::Config("interceptor.queue_capacity must be > 0".into()));
        }
        if self.interceptor.max_in_flight == 0 {
            return Err(EdgelogError::Config("interceptor.max_in_flight must be > 0".into()));
        }
        if self.interceptor.timeout_ms == 0 {
            return Err(EdgelogError::Config("interceptor.timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, EdgelogError> {
        self.server
            .addr
            .parse()
            .map_err(|e| EdgelogError::Config(format!("server.addr {:?}: {e}", self.server.addr)))
    }

    /// URL the interceptor forwards records to, given the address the
    /// listener actually bound (so port 0 resolves to the assigned port).
    ///
    /// Without an explicit `forward_url`, records go back to this process.
    /// A wildcard bind is reached over loopback of the same family; a
    /// specific address is used as is.
    pub fn forward_url(&self, bound: SocketAddr) -> String {
        if let Some(url) = &self.interceptor.forward_url {
            return url.clone();
        }
        let ip = match bound.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!("http://{}{}", SocketAddr::new(ip, bound.port()), self.ingest.path)
    }
}
