//! Application state.

use std::sync::Arc;

use tracing::info;

use vsync_firestore::{FirestoreClient, MemoryVideoStore, VideoRecordRepository, VideoStore};
use vsync_mux::{ImageUrls, SignatureVerifier};
use vsync_storage::{AssetUploader, MirrorConfig, R2Client, UrlMirror};

use crate::config::{ApiConfig, RecordStoreKind, WebhookConfig};
use crate::error::ApiResult;
use crate::services::{DerivedAssetMirror, Reconciler};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub verifier: Arc<SignatureVerifier>,
    pub store: Arc<dyn VideoStore>,
    /// `None` when derived-asset mirroring is disabled
    pub uploader: Option<Arc<dyn AssetUploader>>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig, webhook: WebhookConfig) -> ApiResult<Self> {
        let verifier = webhook.mux.verifier()?;

        let store: Arc<dyn VideoStore> = match webhook.record_store {
            RecordStoreKind::Firestore => {
                let client = FirestoreClient::from_env().await?;
                Arc::new(VideoRecordRepository::with_env_collection(client))
            }
            RecordStoreKind::Memory => {
                info!("Using in-memory record store");
                Arc::new(MemoryVideoStore::new())
            }
        };

        let uploader: Option<Arc<dyn AssetUploader>> = if webhook.mirror_previews {
            let r2 = R2Client::from_env()?;
            Some(Arc::new(UrlMirror::new(r2, MirrorConfig::from_env())?))
        } else {
            info!("Derived asset mirroring disabled");
            None
        };

        Ok(Self::from_parts(
            config,
            verifier,
            store,
            uploader,
            webhook.mux.image_urls(),
        ))
    }

    /// Assemble state from already-built components.
    pub fn from_parts(
        config: ApiConfig,
        verifier: SignatureVerifier,
        store: Arc<dyn VideoStore>,
        uploader: Option<Arc<dyn AssetUploader>>,
        image_urls: ImageUrls,
    ) -> Self {
        let mirror = uploader
            .clone()
            .map(|uploader| DerivedAssetMirror::new(uploader, image_urls));
        let reconciler = Reconciler::new(Arc::clone(&store), mirror);

        Self {
            config,
            verifier: Arc::new(verifier),
            store,
            uploader,
            reconciler: Arc::new(reconciler),
        }
    }
}
