pub mod capture;
pub mod exclusion;
pub mod forwarder;
pub mod layer;

pub use exclusion::ExclusionSet;
pub use forwarder::{ForwarderTask, HttpTransport, LogForwarder, RecordTransport};
pub use layer::Interceptor;
