//! Shared data models for the Mux video sync service.
//!
//! This crate provides Serde-serializable types for:
//! - Video records mirrored from the provider
//! - Provider asset statuses
//! - Correlation keys and the field sets written by conditional updates

pub mod update;
pub mod video;

// Re-export common types
pub use update::{CorrelationKey, MirroredAsset, VideoUpdate};
pub use video::{fields, AssetStatus, VideoId, VideoRecord};
