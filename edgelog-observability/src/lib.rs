pub mod metrics;
pub mod redact;
pub mod sink;

pub use metrics::PipelineMetrics;
pub use sink::{FileSink, Sink, StdoutSink};
