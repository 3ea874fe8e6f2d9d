//! Video record store.
//!
//! This crate provides:
//! - The `VideoStore` trait with conditional, correlation-keyed writes
//! - A Firestore REST implementation (service account or emulator auth)
//! - An in-memory implementation for local runs and tests
//! - Retry with backoff, token caching and request metrics

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;
pub mod video_repo;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use memory::MemoryVideoStore;
pub use retry::RetryConfig;
pub use store::{StoreError, StoreResult, VideoStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
pub use video_repo::VideoRecordRepository;

#[cfg(any(test, feature = "mock"))]
pub use store::MockVideoStore;
