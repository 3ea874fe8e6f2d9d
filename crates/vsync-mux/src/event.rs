//! Webhook event decoding.
//!
//! Payloads are `{ "type": "...", "data": { ... } }`. Only the asset lifecycle
//! events this service reconciles are decoded; every other type is reported
//! as [`EventError::Unrecognized`] so the caller can reject it explicitly.

use serde::Deserialize;
use serde_json::Value;

use vsync_models::{AssetStatus, CorrelationKey};

use crate::error::EventError;

/// Event type discriminants sent by the provider.
pub mod types {
    pub const ASSET_CREATED: &str = "video.asset.created";
    pub const ASSET_READY: &str = "video.asset.ready";
    pub const ASSET_ERRORED: &str = "video.asset.errored";
    pub const ASSET_DELETED: &str = "video.asset.deleted";
    pub const TRACK_READY: &str = "video.asset.track.ready";
}

const MISSING_UPLOAD_ID: &str = "Missing upload id";
const NO_UPLOAD_ID: &str = "No upload id found";
const MISSING_PLAYBACK_ID: &str = "Missing playback id";
const MISSING_ASSET_ID: &str = "Missing asset id";

/// Payload of a `video.asset.ready` event.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetReady {
    pub upload_id: String,
    pub asset_id: Option<String>,
    pub playback_id: String,
    pub status: AssetStatus,
    /// Seconds, as reported by the provider
    pub duration_seconds: Option<f64>,
}

impl AssetReady {
    /// Duration in whole milliseconds; 0 when absent or not a usable number.
    pub fn duration_ms(&self) -> i64 {
        match self.duration_seconds {
            Some(secs) if secs.is_finite() && secs > 0.0 => (secs * 1000.0).round() as i64,
            _ => 0,
        }
    }
}

/// Decoded provider event.
#[derive(Debug, Clone, PartialEq)]
pub enum MuxEvent {
    AssetCreated {
        upload_id: String,
        asset_id: Option<String>,
        status: Option<AssetStatus>,
    },
    AssetReady(AssetReady),
    AssetErrored {
        upload_id: String,
        status: AssetStatus,
    },
    AssetDeleted {
        upload_id: String,
    },
    TrackReady {
        asset_id: String,
        track_id: Option<String>,
        status: Option<String>,
    },
}

impl MuxEvent {
    /// Provider discriminant of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            MuxEvent::AssetCreated { .. } => types::ASSET_CREATED,
            MuxEvent::AssetReady(_) => types::ASSET_READY,
            MuxEvent::AssetErrored { .. } => types::ASSET_ERRORED,
            MuxEvent::AssetDeleted { .. } => types::ASSET_DELETED,
            MuxEvent::TrackReady { .. } => types::TRACK_READY,
        }
    }

    /// Key used to locate the record this event applies to.
    pub fn correlation_key(&self) -> CorrelationKey {
        match self {
            MuxEvent::AssetCreated { upload_id, .. }
            | MuxEvent::AssetErrored { upload_id, .. }
            | MuxEvent::AssetDeleted { upload_id } => CorrelationKey::UploadId(upload_id.clone()),
            MuxEvent::AssetReady(ready) => CorrelationKey::UploadId(ready.upload_id.clone()),
            MuxEvent::TrackReady { asset_id, .. } => CorrelationKey::AssetId(asset_id.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
struct AssetData {
    id: Option<String>,
    upload_id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    playback_ids: Vec<PlaybackIdData>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PlaybackIdData {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackData {
    id: Option<String>,
    asset_id: Option<String>,
    status: Option<String>,
}

/// Decode raw body bytes into an event.
pub fn decode_slice(body: &[u8]) -> Result<MuxEvent, EventError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| EventError::malformed(None, format!("Invalid JSON payload: {}", e)))?;
    decode(&payload)
}

/// Decode a parsed payload into an event.
pub fn decode(payload: &Value) -> Result<MuxEvent, EventError> {
    if !payload.is_object() {
        return Err(EventError::malformed(None, "Event payload must be a JSON object"));
    }

    let envelope = Envelope::deserialize(payload)
        .map_err(|e| EventError::malformed(None, format!("Invalid event envelope: {}", e)))?;

    let event_type = envelope
        .event_type
        .ok_or_else(|| EventError::malformed(None, "Missing event type"))?;

    match event_type.as_str() {
        types::ASSET_CREATED => {
            let data: AssetData = parse_data(&event_type, envelope.data)?;
            let upload_id = required(&event_type, data.upload_id, NO_UPLOAD_ID)?;
            Ok(MuxEvent::AssetCreated {
                upload_id,
                asset_id: non_empty(data.id),
                status: non_empty(data.status).map(AssetStatus::from),
            })
        }
        types::ASSET_READY => {
            let data: AssetData = parse_data(&event_type, envelope.data)?;
            let upload_id = required(&event_type, data.upload_id, MISSING_UPLOAD_ID)?;
            let playback_id = data.playback_ids.into_iter().next().and_then(|p| p.id);
            let playback_id = required(&event_type, playback_id, MISSING_PLAYBACK_ID)?;
            Ok(MuxEvent::AssetReady(AssetReady {
                upload_id,
                asset_id: non_empty(data.id),
                playback_id,
                status: non_empty(data.status)
                    .map(AssetStatus::from)
                    .unwrap_or(AssetStatus::Ready),
                duration_seconds: data.duration,
            }))
        }
        types::ASSET_ERRORED => {
            let data: AssetData = parse_data(&event_type, envelope.data)?;
            let upload_id = required(&event_type, data.upload_id, MISSING_UPLOAD_ID)?;
            Ok(MuxEvent::AssetErrored {
                upload_id,
                status: non_empty(data.status)
                    .map(AssetStatus::from)
                    .unwrap_or(AssetStatus::Errored),
            })
        }
        types::ASSET_DELETED => {
            let data: AssetData = parse_data(&event_type, envelope.data)?;
            let upload_id = required(&event_type, data.upload_id, MISSING_UPLOAD_ID)?;
            Ok(MuxEvent::AssetDeleted { upload_id })
        }
        types::TRACK_READY => {
            let data: TrackData = parse_data(&event_type, envelope.data)?;
            let asset_id = required(&event_type, data.asset_id, MISSING_ASSET_ID)?;
            Ok(MuxEvent::TrackReady {
                asset_id,
                track_id: non_empty(data.id),
                status: non_empty(data.status),
            })
        }
        _ => Err(EventError::Unrecognized(event_type)),
    }
}

fn parse_data<T>(event_type: &str, data: Value) -> Result<T, EventError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data)
        .map_err(|e| EventError::malformed(Some(event_type), format!("Invalid event data: {}", e)))
}

fn required(event_type: &str, value: Option<String>, reason: &str) -> Result<String, EventError> {
    non_empty(value).ok_or_else(|| EventError::malformed(Some(event_type), reason))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
