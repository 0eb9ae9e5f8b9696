//! Error types for the forecast pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the forecast pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data error (invalid or missing data).
    #[error("Data error: {0}")]
    Data(String),

    /// Insufficient data for computation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Feature or target column lookup failure.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A manifest already exists for this model version with different content.
    #[error("Manifest conflict: {0}")]
    ManifestConflict(String),

    /// Recomputed output falls outside the recorded tolerance.
    #[error("Parity mismatch: {0}")]
    ParityMismatch(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create an insufficient data error.
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Error::InsufficientData(msg.into())
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Create a manifest conflict error.
    pub fn manifest_conflict(msg: impl Into<String>) -> Self {
        Error::ManifestConflict(msg.into())
    }

    /// Create a parity mismatch error.
    pub fn parity_mismatch(msg: impl Into<String>) -> Self {
        Error::ParityMismatch(msg.into())
    }
}
