//! API configuration.

use std::time::Duration;

use vsync_mux::{MuxConfig, MuxResult};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Serve Prometheus metrics at /metrics
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

/// Which record store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreKind {
    Firestore,
    /// Process-local, for development
    Memory,
}

impl RecordStoreKind {
    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "memory" => RecordStoreKind::Memory,
            _ => RecordStoreKind::Firestore,
        }
    }
}

/// Webhook pipeline configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub mux: MuxConfig,
    /// Mirror thumbnails and previews into R2 on `video.asset.ready`
    pub mirror_previews: bool,
    pub record_store: RecordStoreKind,
}

impl WebhookConfig {
    /// Create config from environment variables. Fails without a signing
    /// secret.
    pub fn from_env() -> MuxResult<Self> {
        Ok(Self {
            mux: MuxConfig::from_env()?,
            mirror_previews: std::env::var("MIRROR_PREVIEWS")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"))
                .unwrap_or(true),
            record_store: std::env::var("RECORD_STORE")
                .map(|v| RecordStoreKind::parse(&v))
                .unwrap_or(RecordStoreKind::Firestore),
        })
    }
}
