pub mod config;
pub mod error;
pub mod profile;
pub mod record;

pub use config::EdgelogConfig;
pub use error::EdgelogError;
pub use profile::DeploymentProfile;
pub use record::LogRecord;
