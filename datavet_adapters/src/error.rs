//! Error types for staging and adapters.

use thiserror::Error;

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Archive staging failure. A single kind on purpose: every unpack problem
/// maps to one `UNPACK_ERROR` issue, with the cause in the message.
#[derive(Debug, Error)]
#[error("unpack failed: {0}")]
pub struct UnpackError(pub String);

impl From<std::io::Error> for UnpackError {
    fn from(err: std::io::Error) -> Self {
        UnpackError(format!("io: {err}"))
    }
}

/// Errors raised while opening or loading a source into the engine.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The source could not be opened or read
    #[error("{0}")]
    Open(String),

    /// Registration or query against the engine failed
    #[error("engine: {0}")]
    Engine(#[from] datavet_engine::EngineError),

    /// Batch construction failed
    #[error("arrow: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// The configured deadline elapsed during a chunked copy
    #[error("deadline exceeded while copying chunks")]
    DeadlineExceeded,
}

impl From<rusqlite::Error> for AdapterError {
    fn from(err: rusqlite::Error) -> Self {
        AdapterError::Open(format!("sqlite: {err}"))
    }
}

impl From<shapefile::Error> for AdapterError {
    fn from(err: shapefile::Error) -> Self {
        AdapterError::Open(format!("shapefile: {err}"))
    }
}

impl From<datafusion::error::DataFusionError> for AdapterError {
    fn from(err: datafusion::error::DataFusionError) -> Self {
        AdapterError::Engine(err.into())
    }
}
