//! Derived-asset mirroring for ready assets.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use vsync_models::MirroredAsset;
use vsync_mux::ImageUrls;
use vsync_storage::{AssetUploader, StorageResult, StoredObject};

use crate::error::{WebhookError, WebhookResult};
use crate::metrics;

/// Thumbnail and preview copied into owned storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAssets {
    pub thumbnail: MirroredAsset,
    pub preview: MirroredAsset,
}

/// Copies the provider's transient thumbnail and animated preview into owned
/// storage.
#[derive(Clone)]
pub struct DerivedAssetMirror {
    uploader: Arc<dyn AssetUploader>,
    image_urls: ImageUrls,
}

impl DerivedAssetMirror {
    pub fn new(uploader: Arc<dyn AssetUploader>, image_urls: ImageUrls) -> Self {
        Self {
            uploader,
            image_urls,
        }
    }

    pub fn uploader(&self) -> &Arc<dyn AssetUploader> {
        &self.uploader
    }

    /// Mirror both derived assets for `playback_id`.
    ///
    /// The pair is all-or-nothing: if either upload fails the caller gets
    /// `MirrorFailure` and must not write any of the derived fields.
    pub async fn mirror(&self, playback_id: &str) -> WebhookResult<DerivedAssets> {
        let sources = [
            self.image_urls.thumbnail(playback_id),
            self.image_urls.animated_preview(playback_id),
        ];
        let start = Instant::now();

        let mut results = self.uploader.upload_from_urls(&sources).await.into_iter();
        let outcome = match (results.next(), results.next()) {
            (Some(thumbnail), Some(preview)) => pair(thumbnail, preview),
            _ => Err(WebhookError::MirrorFailure(
                "uploader returned fewer results than requested".to_string(),
            )),
        };

        metrics::record_mirror(start.elapsed().as_secs_f64(), outcome.is_ok());

        match &outcome {
            Ok(assets) => info!(
                playback_id = %playback_id,
                thumbnail_key = %assets.thumbnail.key,
                preview_key = %assets.preview.key,
                "Mirrored derived assets"
            ),
            Err(e) => warn!(playback_id = %playback_id, "Derived asset mirror failed: {}", e),
        }

        outcome
    }
}

fn pair(
    thumbnail: StorageResult<StoredObject>,
    preview: StorageResult<StoredObject>,
) -> WebhookResult<DerivedAssets> {
    match (thumbnail, preview) {
        (Ok(thumbnail), Ok(preview)) => Ok(DerivedAssets {
            thumbnail: thumbnail.into(),
            preview: preview.into(),
        }),
        (Err(e), _) => Err(WebhookError::MirrorFailure(format!("thumbnail: {}", e))),
        (_, Err(e)) => Err(WebhookError::MirrorFailure(format!("preview: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeUploader;

    #[tokio::test]
    async fn test_mirror_requests_thumbnail_then_preview() {
        let uploader = Arc::new(FakeUploader::new());
        let mirror = DerivedAssetMirror::new(uploader.clone(), ImageUrls::default());

        let assets = mirror.mirror("P").await.unwrap();

        assert_eq!(
            uploader.requested().await,
            vec![
                "https://image.mux.com/P/thumbnail.jpg".to_string(),
                "https://image.mux.com/P/animated.gif".to_string(),
            ]
        );
        assert_eq!(assets.thumbnail.key, "mirror/image.mux.com/P/thumbnail.jpg");
        assert_eq!(assets.preview.key, "mirror/image.mux.com/P/animated.gif");
    }

    #[tokio::test]
    async fn test_single_failure_fails_the_pair() {
        let uploader = Arc::new(FakeUploader::failing("animated.gif"));
        let mirror = DerivedAssetMirror::new(uploader, ImageUrls::default());

        let err = mirror.mirror("P").await.unwrap_err();
        assert!(matches!(err, WebhookError::MirrorFailure(ref msg) if msg.starts_with("preview")));
    }
}
