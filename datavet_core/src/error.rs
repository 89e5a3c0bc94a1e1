//! Error types for core operations.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while serializing or persisting reports.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Report could not be written
    #[error("report write failed: {0}")]
    Io(#[from] std::io::Error),
}
