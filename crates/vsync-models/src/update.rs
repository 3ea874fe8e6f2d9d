//! Correlation keys and conditional update field sets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::video::{fields, AssetStatus, VideoRecord};

/// External identifier a provider event uses to address a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CorrelationKey {
    /// Matches `mux_upload_id`
    UploadId(String),
    /// Matches `mux_asset_id`
    AssetId(String),
}

impl CorrelationKey {
    /// Stored field this key is matched against.
    pub fn field(&self) -> &'static str {
        match self {
            CorrelationKey::UploadId(_) => fields::MUX_UPLOAD_ID,
            CorrelationKey::AssetId(_) => fields::MUX_ASSET_ID,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            CorrelationKey::UploadId(v) | CorrelationKey::AssetId(v) => v,
        }
    }

    /// Whether `record` is addressed by this key.
    pub fn matches(&self, record: &VideoRecord) -> bool {
        match self {
            CorrelationKey::UploadId(v) => record.mux_upload_id == *v,
            CorrelationKey::AssetId(v) => record.mux_asset_id.as_deref() == Some(v.as_str()),
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field(), self.value())
    }
}

/// A derived asset copied into owned storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirroredAsset {
    pub key: String,
    pub url: String,
}

/// Fields written by a single conditional update.
///
/// Only `Some` fields are written; everything else on the record is left
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoUpdate {
    pub mux_asset_id: Option<String>,
    pub mux_status: Option<AssetStatus>,
    pub mux_playback_id: Option<String>,
    pub mux_track_id: Option<String>,
    pub mux_track_status: Option<String>,
    pub thumbnail: Option<MirroredAsset>,
    pub preview: Option<MirroredAsset>,
    /// Milliseconds
    pub duration: Option<i64>,
}

impl VideoUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.mux_asset_id = Some(asset_id.into());
        self
    }

    pub fn status(mut self, status: AssetStatus) -> Self {
        self.mux_status = Some(status);
        self
    }

    pub fn playback_id(mut self, playback_id: impl Into<String>) -> Self {
        self.mux_playback_id = Some(playback_id.into());
        self
    }

    pub fn track(mut self, track_id: impl Into<String>, track_status: impl Into<String>) -> Self {
        self.mux_track_id = Some(track_id.into());
        self.mux_track_status = Some(track_status.into());
        self
    }

    pub fn thumbnail(mut self, asset: MirroredAsset) -> Self {
        self.thumbnail = Some(asset);
        self
    }

    pub fn preview(mut self, asset: MirroredAsset) -> Self {
        self.preview = Some(asset);
        self
    }

    pub fn duration_ms(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.field_paths().is_empty()
    }

    /// Stored field names written by this update, in a stable order.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.mux_asset_id.is_some() {
            paths.push(fields::MUX_ASSET_ID);
        }
        if self.mux_status.is_some() {
            paths.push(fields::MUX_STATUS);
        }
        if self.mux_playback_id.is_some() {
            paths.push(fields::MUX_PLAYBACK_ID);
        }
        if self.mux_track_id.is_some() {
            paths.push(fields::MUX_TRACK_ID);
        }
        if self.mux_track_status.is_some() {
            paths.push(fields::MUX_TRACK_STATUS);
        }
        if self.thumbnail.is_some() {
            paths.push(fields::THUMBNAIL_URL);
            paths.push(fields::THUMBNAIL_KEY);
        }
        if self.preview.is_some() {
            paths.push(fields::PREVIEW_URL);
            paths.push(fields::PREVIEW_KEY);
        }
        if self.duration.is_some() {
            paths.push(fields::DURATION);
        }
        paths
    }

    /// Apply the update to an in-memory record.
    pub fn apply_to(&self, record: &mut VideoRecord) {
        if let Some(ref asset_id) = self.mux_asset_id {
            record.mux_asset_id = Some(asset_id.clone());
        }
        if let Some(ref status) = self.mux_status {
            record.mux_status = status.clone();
        }
        if let Some(ref playback_id) = self.mux_playback_id {
            record.mux_playback_id = Some(playback_id.clone());
        }
        if let Some(ref track_id) = self.mux_track_id {
            record.mux_track_id = Some(track_id.clone());
        }
        if let Some(ref track_status) = self.mux_track_status {
            record.mux_track_status = Some(track_status.clone());
        }
        if let Some(ref thumb) = self.thumbnail {
            record.thumbnail_key = Some(thumb.key.clone());
            record.thumbnail_url = Some(thumb.url.clone());
        }
        if let Some(ref preview) = self.preview {
            record.preview_key = Some(preview.key.clone());
            record.preview_url = Some(preview.url.clone());
        }
        if let Some(duration) = self.duration {
            record.duration = duration;
        }
    }
}
