//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - Object upload to R2
//! - Public URLs for stored objects
//! - Mirroring of remote CDN assets into R2 under deterministic keys

pub mod client;
pub mod error;
pub mod mirror;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use mirror::{mirror_key, AssetUploader, MirrorConfig, ObjectStore, StoredObject, UrlMirror};
