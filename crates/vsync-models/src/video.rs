//! Video record models.

use chrono::{DateTime, Utc};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stored field names, shared by every record store backend.
pub mod fields {
    pub const MUX_UPLOAD_ID: &str = "mux_upload_id";
    pub const MUX_ASSET_ID: &str = "mux_asset_id";
    pub const MUX_STATUS: &str = "mux_status";
    pub const MUX_PLAYBACK_ID: &str = "mux_playback_id";
    pub const MUX_TRACK_ID: &str = "mux_track_id";
    pub const MUX_TRACK_STATUS: &str = "mux_track_status";
    pub const THUMBNAIL_URL: &str = "thumbnail_url";
    pub const THUMBNAIL_KEY: &str = "thumbnail_key";
    pub const PREVIEW_URL: &str = "preview_url";
    pub const PREVIEW_KEY: &str = "preview_key";
    pub const DURATION: &str = "duration";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Internal identifier of a video record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Provider-reported asset lifecycle status.
///
/// The provider may introduce statuses this service does not know about yet;
/// those are carried verbatim in `Other` so last-write-wins still holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetStatus {
    /// Upload initiated, no asset yet
    #[default]
    Created,
    /// Provider is ingesting/encoding the asset
    Preparing,
    /// Asset is playable
    Ready,
    /// Provider failed to process the asset
    Errored,
    /// Any status not listed above
    Other(String),
}

impl AssetStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AssetStatus::Created => "created",
            AssetStatus::Preparing => "preparing",
            AssetStatus::Ready => "ready",
            AssetStatus::Errored => "errored",
            AssetStatus::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "created" => AssetStatus::Created,
            "preparing" => AssetStatus::Preparing,
            "ready" => AssetStatus::Ready,
            "errored" => AssetStatus::Errored,
            other => AssetStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for AssetStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&str> for AssetStatus {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<AssetStatus> for String {
    fn from(status: AssetStatus) -> Self {
        status.as_str().to_string()
    }
}

impl JsonSchema for AssetStatus {
    fn schema_name() -> String {
        "AssetStatus".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

/// A video record kept in sync with the provider's asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    /// Internal ID, owned by the record store
    pub id: VideoId,

    /// Upload correlation key, set when the upload was initiated
    pub mux_upload_id: String,

    /// Asset correlation key, set once the provider created the asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux_asset_id: Option<String>,

    /// Last status reported by the provider
    #[serde(default)]
    pub mux_status: AssetStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux_playback_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux_track_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux_track_status: Option<String>,

    /// Mirrored thumbnail in owned storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,

    /// Mirrored animated preview in owned storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_key: Option<String>,

    /// Duration in milliseconds
    #[serde(default)]
    pub duration: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Create the record written at upload initiation.
    pub fn new(mux_upload_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: VideoId::new(),
            mux_upload_id: mux_upload_id.into(),
            mux_asset_id: None,
            mux_status: AssetStatus::Created,
            mux_playback_id: None,
            mux_track_id: None,
            mux_track_status: None,
            thumbnail_url: None,
            thumbnail_key: None,
            preview_url: None,
            preview_key: None,
            duration: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the asset is playable.
    pub fn is_ready(&self) -> bool {
        self.mux_status == AssetStatus::Ready && self.mux_playback_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_generation() {
        let id1 = VideoId::new();
        let id2 = VideoId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_record_has_no_provider_fields() {
        let record = VideoRecord::new("upload-1");
        assert_eq!(record.mux_upload_id, "upload-1");
        assert_eq!(record.mux_status, AssetStatus::Created);
        assert!(record.mux_asset_id.is_none());
        assert!(record.thumbnail_key.is_none());
        assert_eq!(record.duration, 0);
        assert!(!record.is_ready());
    }

    #[test]
    fn test_asset_status_round_trips_unknown_values() {
        assert_eq!(AssetStatus::parse("ready"), AssetStatus::Ready);
        let unknown = AssetStatus::parse("migrating");
        assert_eq!(unknown, AssetStatus::Other("migrating".to_string()));
        assert_eq!(unknown.as_str(), "migrating");

        let json = serde_json::to_string(&AssetStatus::Errored).unwrap();
        assert_eq!(json, "\"errored\"");
        let parsed: AssetStatus = serde_json::from_str("\"preparing\"").unwrap();
        assert_eq!(parsed, AssetStatus::Preparing);
    }
}
