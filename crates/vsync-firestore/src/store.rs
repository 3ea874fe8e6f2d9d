//! Record store abstraction.
//!
//! Every write is conditional on a correlation key. Updating or deleting a
//! key that matches nothing is not an error: it affects zero rows, and
//! callers decide what that means.

use async_trait::async_trait;
use thiserror::Error;

use vsync_models::{CorrelationKey, VideoRecord, VideoUpdate};

use crate::error::FirestoreError;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Record store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// More than one record carries the same correlation key
    #[error("Correlation key {key} matches {matches} records")]
    AmbiguousKey { key: String, matches: usize },

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Firestore(#[from] FirestoreError),
}

impl StoreError {
    pub fn ambiguous(key: &CorrelationKey, matches: usize) -> Self {
        Self::AmbiguousKey {
            key: key.to_string(),
            matches,
        }
    }
}

/// Persistence for video records.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Record addressed by `key`, if any.
    async fn find_by(&self, key: &CorrelationKey) -> StoreResult<Option<VideoRecord>>;

    /// Apply `update` to the record addressed by `key`. Returns rows affected.
    async fn update_where(&self, key: &CorrelationKey, update: &VideoUpdate) -> StoreResult<u64>;

    /// Apply `update` unless the record is already ready. The readiness
    /// check is part of the write: a record that turns ready concurrently is
    /// left alone. Returns rows affected.
    async fn update_unless_ready(&self, key: &CorrelationKey, update: &VideoUpdate)
        -> StoreResult<u64>;

    /// Delete the record addressed by `key`. Returns rows affected.
    async fn delete_where(&self, key: &CorrelationKey) -> StoreResult<u64>;

    /// Insert a new record, as done at upload initiation.
    async fn create(&self, record: &VideoRecord) -> StoreResult<()>;

    /// Cheap round trip used by readiness checks.
    async fn check_health(&self) -> StoreResult<()>;
}
