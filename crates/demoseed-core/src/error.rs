use thiserror::Error;

/// Core error type shared across demoseed crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The record schema violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A persisted record set cannot be used.
    #[error("invalid record set {path}: {message}")]
    InvalidRecordSet { path: String, message: String },
    /// Filesystem failure while reading or writing artifacts.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encode/decode failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results returned by demoseed crates.
pub type Result<T> = std::result::Result<T, Error>;
