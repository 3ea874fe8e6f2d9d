//! Mux client configuration.

use std::time::Duration;

use crate::cdn::{ImageUrls, DEFAULT_IMAGE_BASE_URL};
use crate::error::{MuxError, MuxResult};
use crate::signature::{SignatureVerifier, DEFAULT_TOLERANCE_SECS};

/// Configuration for webhook verification and CDN access.
#[derive(Clone)]
pub struct MuxConfig {
    /// Webhook signing secret
    pub webhook_secret: String,
    /// Allowed skew between the signed timestamp and now
    pub signature_tolerance: Duration,
    /// Image CDN base URL
    pub image_base_url: String,
}

impl std::fmt::Debug for MuxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxConfig")
            .field("webhook_secret", &"<redacted>")
            .field("signature_tolerance", &self.signature_tolerance)
            .field("image_base_url", &self.image_base_url)
            .finish()
    }
}

impl MuxConfig {
    /// Create config from environment variables.
    ///
    /// `MUX_WEBHOOK_SECRET` is required; without it webhooks cannot be
    /// verified and the service must not start.
    pub fn from_env() -> MuxResult<Self> {
        let webhook_secret = std::env::var("MUX_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| MuxError::configuration("Missing MUX_WEBHOOK_SECRET"))?;

        Ok(Self {
            webhook_secret,
            signature_tolerance: Duration::from_secs(
                std::env::var("MUX_SIGNATURE_TOLERANCE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TOLERANCE_SECS),
            ),
            image_base_url: std::env::var("MUX_IMAGE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_BASE_URL.to_string()),
        })
    }

    /// Build the webhook verifier.
    pub fn verifier(&self) -> MuxResult<SignatureVerifier> {
        Ok(SignatureVerifier::new(&self.webhook_secret)?.with_tolerance(self.signature_tolerance))
    }

    /// Build the CDN URL templates.
    pub fn image_urls(&self) -> ImageUrls {
        ImageUrls::new(&self.image_base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_missing_secret_is_configuration_error() {
        std::env::remove_var("MUX_WEBHOOK_SECRET");
        assert!(matches!(MuxConfig::from_env(), Err(MuxError::Configuration(_))));

        std::env::set_var("MUX_WEBHOOK_SECRET", "  ");
        assert!(matches!(MuxConfig::from_env(), Err(MuxError::Configuration(_))));
        std::env::remove_var("MUX_WEBHOOK_SECRET");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        std::env::set_var("MUX_WEBHOOK_SECRET", "secret");
        std::env::remove_var("MUX_SIGNATURE_TOLERANCE_SECS");
        std::env::remove_var("MUX_IMAGE_BASE_URL");

        let config = MuxConfig::from_env().unwrap();
        assert_eq!(config.signature_tolerance, Duration::from_secs(300));
        assert_eq!(config.image_base_url, DEFAULT_IMAGE_BASE_URL);
        assert!(config.verifier().is_ok());
        assert!(!format!("{:?}", config).contains("\"secret\""));
        std::env::remove_var("MUX_WEBHOOK_SECRET");
    }
}
