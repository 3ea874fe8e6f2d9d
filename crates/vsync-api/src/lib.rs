//! Axum webhook server.
//!
//! This crate provides:
//! - Signed Mux webhook intake at `POST /api/videos/webhook`
//! - Derived-asset mirroring and record reconciliation services
//! - Security headers, request IDs and request logging
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, RecordStoreKind, WebhookConfig};
pub use error::{ApiError, ApiResult, WebhookError, WebhookResult};
pub use routes::create_router;
pub use services::{DerivedAssetMirror, DerivedAssets, Reconciler};
pub use state::AppState;
