//! Webhook processing services.

pub mod mirror;
pub mod reconciler;

pub use mirror::{DerivedAssetMirror, DerivedAssets};
pub use reconciler::Reconciler;
