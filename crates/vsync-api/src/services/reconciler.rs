//! Applies decoded provider events to video records.

use std::sync::Arc;

use tracing::info;

use vsync_firestore::VideoStore;
use vsync_models::{AssetStatus, VideoUpdate};
use vsync_mux::{AssetReady, MuxEvent};

use crate::error::WebhookResult;
use crate::services::mirror::DerivedAssetMirror;

/// Moves a video record through the asset lifecycle.
///
/// Every transition is a single conditional write keyed by upload ID (or
/// asset ID for track events). A key that matches no record is a no-op, so
/// redelivered and out-of-order events are harmless.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn VideoStore>,
    mirror: Option<DerivedAssetMirror>,
}

impl Reconciler {
    /// `mirror` is `None` when derived-asset mirroring is disabled.
    pub fn new(store: Arc<dyn VideoStore>, mirror: Option<DerivedAssetMirror>) -> Self {
        Self { store, mirror }
    }

    pub fn store(&self) -> &Arc<dyn VideoStore> {
        &self.store
    }

    pub fn mirror(&self) -> Option<&DerivedAssetMirror> {
        self.mirror.as_ref()
    }

    /// Apply `event`, returning the number of records affected.
    pub async fn apply(&self, event: &MuxEvent) -> WebhookResult<u64> {
        let key = event.correlation_key();

        let rows = match event {
            MuxEvent::AssetCreated {
                asset_id, status, ..
            } => {
                let update = VideoUpdate {
                    mux_asset_id: asset_id.clone(),
                    mux_status: status.clone(),
                    ..VideoUpdate::default()
                };
                if update.is_empty() {
                    0
                } else {
                    // A late `created` must not roll a ready record back.
                    self.store.update_unless_ready(&key, &update).await?
                }
            }
            MuxEvent::AssetReady(ready) => {
                let update = self.ready_update(ready).await?;
                self.store.update_where(&key, &update).await?
            }
            MuxEvent::AssetErrored { status, .. } => {
                let update = VideoUpdate::new().status(status.clone());
                self.store.update_where(&key, &update).await?
            }
            MuxEvent::AssetDeleted { .. } => self.store.delete_where(&key).await?,
            MuxEvent::TrackReady {
                track_id, status, ..
            } => {
                let update = VideoUpdate {
                    mux_track_id: track_id.clone(),
                    mux_track_status: status.clone(),
                    ..VideoUpdate::default()
                };
                if update.is_empty() {
                    0
                } else {
                    self.store.update_where(&key, &update).await?
                }
            }
        };

        info!(
            event_type = event.event_type(),
            key = %key,
            rows = rows,
            "Applied webhook event"
        );

        Ok(rows)
    }

    /// Build the ready transition. Derived assets are mirrored first so a
    /// mirror failure leaves the record untouched.
    async fn ready_update(&self, ready: &AssetReady) -> WebhookResult<VideoUpdate> {
        let mut update = VideoUpdate::new()
            .playback_id(&ready.playback_id)
            .status(AssetStatus::Ready)
            .duration_ms(ready.duration_ms());

        if let Some(ref asset_id) = ready.asset_id {
            update = update.asset_id(asset_id);
        }

        if let Some(ref mirror) = self.mirror {
            let assets = mirror.mirror(&ready.playback_id).await?;
            update = update.thumbnail(assets.thumbnail).preview(assets.preview);
        }

        Ok(update)
    }
}
