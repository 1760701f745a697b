//! Error types for scolaris-core

use thiserror::Error;

/// Main error type for the scolaris-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Record store unreachable or query failed
    #[error("record store error: {0}")]
    FetchFailed(#[from] rusqlite::Error),

    /// Record fetch exceeded the configured bound
    #[error("record fetch timed out after {0}s")]
    FetchTimeout(u64),

    /// Unknown student or teacher id
    #[error("unknown entity: {0}")]
    InvalidEntity(String),

    /// Unexpected data shape (e.g. a rating outside 1-5)
    #[error("computation error: {0}")]
    Computation(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the façade may fall back to a cached value for this error.
    ///
    /// `InvalidEntity` is authoritative and never masked by stale data.
    pub fn allows_stale_fallback(&self) -> bool {
        !matches!(self, Error::InvalidEntity(_))
    }
}

/// Result type alias for scolaris-core
pub type Result<T> = std::result::Result<T, Error>;
