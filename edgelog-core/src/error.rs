use thiserror::Error;

/// Unified error type for edgelog.
#[derive(Error, Debug)]
pub enum EdgelogError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid log record: {0}")]
    InvalidRecord(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

impl EdgelogError {
    /// True for faults in the persistence layer itself, as opposed to bad input.
    pub fn is_persistence_fault(&self) -> bool {
        matches!(self, EdgelogError::Sink(_))
    }
}
