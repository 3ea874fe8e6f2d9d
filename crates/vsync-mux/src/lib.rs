//! Mux provider client.
//!
//! This crate provides:
//! - Webhook signature verification against the raw request body
//! - Decoding of asset lifecycle webhooks into a closed set of events
//! - Well-known image CDN URLs for a playback ID

pub mod cdn;
pub mod config;
pub mod error;
pub mod event;
pub mod signature;

pub use cdn::ImageUrls;
pub use config::MuxConfig;
pub use error::{EventError, MuxError, MuxResult, SignatureError};
pub use event::{decode, decode_slice, AssetReady, MuxEvent};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
