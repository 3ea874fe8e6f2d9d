//! Image CDN URLs for a playback ID.

/// Default image CDN base.
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://image.mux.com";

/// Builds the transient CDN URLs the provider serves for a ready asset.
#[derive(Debug, Clone)]
pub struct ImageUrls {
    base_url: String,
}

impl Default for ImageUrls {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_BASE_URL)
    }
}

impl ImageUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Still thumbnail (JPEG).
    pub fn thumbnail(&self, playback_id: &str) -> String {
        format!("{}/{}/thumbnail.jpg", self.base_url, playback_id)
    }

    /// Animated preview (GIF).
    pub fn animated_preview(&self, playback_id: &str) -> String {
        format!("{}/{}/animated.gif", self.base_url, playback_id)
    }
}
