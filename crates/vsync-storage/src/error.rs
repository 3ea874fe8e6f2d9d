//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures fetching source assets or writing them to object storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage misconfigured: {0}")]
    Config(String),

    /// Source URL could not be fetched or answered with a non-2xx status
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Object too large: {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Write of {key} failed: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Bucket unreachable: {0}")]
    Unreachable(String),
}

impl StorageError {
    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }
}
