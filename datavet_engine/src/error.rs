//! Error types for engine operations.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the query session, the geometry normalizer, or the
/// validation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A query failed to plan or execute
    #[error("query failed: {0}")]
    Query(#[from] datafusion::error::DataFusionError),

    /// Batch construction or downcast failure
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// A query produced a shape the engine does not know how to read
    #[error("unexpected query result: {0}")]
    UnexpectedResult(String),
}
