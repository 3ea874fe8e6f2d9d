//! Firestore-backed video record store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use vsync_models::{fields, AssetStatus, CorrelationKey, VideoId, VideoRecord, VideoUpdate};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_key_matches;
use crate::store::{StoreError, StoreResult, VideoStore};
use crate::types::{Document, FromFirestoreValue, Precondition, StructuredQuery, ToFirestoreValue, Value};

/// Default collection holding video records.
pub const DEFAULT_COLLECTION: &str = "videos";

/// Reads and guarded writes before a record that keeps changing is given up on.
const GUARDED_WRITE_ATTEMPTS: u32 = 3;

/// Repository for video documents.
pub struct VideoRecordRepository {
    client: FirestoreClient,
    collection: String,
}

impl VideoRecordRepository {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    /// Repository over the collection named by `VIDEOS_COLLECTION`.
    pub fn with_env_collection(client: FirestoreClient) -> Self {
        let collection = std::env::var("VIDEOS_COLLECTION")
            .ok()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        Self::new(client, collection)
    }

    /// Documents matching `key`. At most two are fetched, which is enough
    /// to detect a duplicated key.
    async fn query_key(&self, key: &CorrelationKey) -> FirestoreResult<Vec<Document>> {
        let docs = self
            .client
            .with_retry("query_video_by_key", || {
                self.client.run_query(StructuredQuery::field_equals(
                    &self.collection,
                    key.field(),
                    key.value().to_firestore_value(),
                    2,
                ))
            })
            .await?;
        record_key_matches(&self.collection, docs.len());
        Ok(docs)
    }

    /// PATCH the masked fields of `update` onto `doc_id` under `precondition`.
    async fn patch(
        &self,
        doc_id: &str,
        update: &VideoUpdate,
        precondition: &Precondition,
    ) -> FirestoreResult<()> {
        let (fields, mask) = video_update_to_fields(update);
        let mask_refs: Vec<&str> = mask.iter().map(String::as_str).collect();

        self.client
            .with_retry("update_video", || {
                self.client.update_document(
                    &self.collection,
                    doc_id,
                    fields.clone(),
                    &mask_refs,
                    Some(precondition),
                )
            })
            .await
            .map(|_| ())
    }

    /// Resolve `key` to a single document ID.
    async fn resolve(&self, key: &CorrelationKey) -> StoreResult<Option<(String, Document)>> {
        let mut docs = self.query_key(key).await?;
        match docs.len() {
            0 => Ok(None),
            1 => {
                let doc = docs.remove(0);
                let id = doc
                    .id()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        FirestoreError::InvalidResponse("Query result has no document name".to_string())
                    })?;
                Ok(Some((id, doc)))
            }
            n => {
                warn!(key = %key, matches = n, "Correlation key is not unique");
                Err(StoreError::ambiguous(key, n))
            }
        }
    }
}

#[async_trait]
impl VideoStore for VideoRecordRepository {
    async fn find_by(&self, key: &CorrelationKey) -> StoreResult<Option<VideoRecord>> {
        match self.resolve(key).await? {
            Some((id, doc)) => Ok(Some(document_to_video_record(&doc, VideoId::from(id))?)),
            None => Ok(None),
        }
    }

    async fn update_where(&self, key: &CorrelationKey, update: &VideoUpdate) -> StoreResult<u64> {
        let Some((doc_id, _)) = self.resolve(key).await? else {
            debug!(key = %key, "No record to update");
            return Ok(0);
        };

        match self.patch(&doc_id, update, &Precondition::must_exist()).await {
            Ok(()) => {
                info!(key = %key, video_id = %doc_id, "Updated video record");
                Ok(1)
            }
            // Deleted between lookup and write; the precondition kept it deleted
            Err(e) if e.is_precondition_failed() => {
                debug!(key = %key, video_id = %doc_id, "Record vanished before update");
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_unless_ready(
        &self,
        key: &CorrelationKey,
        update: &VideoUpdate,
    ) -> StoreResult<u64> {
        for attempt in 1..=GUARDED_WRITE_ATTEMPTS {
            let Some((doc_id, doc)) = self.resolve(key).await? else {
                debug!(key = %key, "No record to update");
                return Ok(0);
            };

            let current = document_to_video_record(&doc, VideoId::from(doc_id.clone()))?;
            if current.is_ready() {
                debug!(key = %key, video_id = %doc_id, "Record already ready, update skipped");
                return Ok(0);
            }

            let update_time = doc.update_time.clone().ok_or_else(|| {
                FirestoreError::InvalidResponse(format!("Video {} has no updateTime", doc_id))
            })?;

            match self
                .patch(&doc_id, update, &Precondition::unchanged_since(update_time))
                .await
            {
                Ok(()) => {
                    info!(key = %key, video_id = %doc_id, "Updated video record");
                    return Ok(1);
                }
                // Written or deleted since the read; look again
                Err(e) if e.is_precondition_failed() => {
                    debug!(key = %key, video_id = %doc_id, attempt, "Record changed before guarded update");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(key = %key, "Record kept changing, guarded update dropped");
        Ok(0)
    }

    async fn delete_where(&self, key: &CorrelationKey) -> StoreResult<u64> {
        let Some((doc_id, _)) = self.resolve(key).await? else {
            debug!(key = %key, "No record to delete");
            return Ok(0);
        };

        self.client
            .with_retry("delete_video", || {
                self.client.delete_document(&self.collection, &doc_id)
            })
            .await?;

        info!(key = %key, video_id = %doc_id, "Deleted video record");
        Ok(1)
    }

    async fn create(&self, record: &VideoRecord) -> StoreResult<()> {
        let fields = video_record_to_fields(record);
        match self
            .client
            .create_document(&self.collection, record.id.as_str(), fields)
            .await
        {
            Ok(_) => {
                info!("Created video record: {}", record.id);
                Ok(())
            }
            Err(FirestoreError::AlreadyExists(path)) => Err(StoreError::AlreadyExists(path)),
            Err(e) => Err(e.into()),
        }
    }

    async fn check_health(&self) -> StoreResult<()> {
        self.client
            .run_query(StructuredQuery::all(&self.collection, 1))
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

// Helper functions for conversion

fn video_record_to_fields(record: &VideoRecord) -> HashMap<String, Value> {
    let mut f = HashMap::new();
    f.insert(fields::MUX_UPLOAD_ID.to_string(), record.mux_upload_id.to_firestore_value());
    f.insert(fields::MUX_ASSET_ID.to_string(), record.mux_asset_id.to_firestore_value());
    f.insert(fields::MUX_STATUS.to_string(), record.mux_status.as_str().to_firestore_value());
    f.insert(fields::MUX_PLAYBACK_ID.to_string(), record.mux_playback_id.to_firestore_value());
    f.insert(fields::MUX_TRACK_ID.to_string(), record.mux_track_id.to_firestore_value());
    f.insert(fields::MUX_TRACK_STATUS.to_string(), record.mux_track_status.to_firestore_value());
    f.insert(fields::THUMBNAIL_URL.to_string(), record.thumbnail_url.to_firestore_value());
    f.insert(fields::THUMBNAIL_KEY.to_string(), record.thumbnail_key.to_firestore_value());
    f.insert(fields::PREVIEW_URL.to_string(), record.preview_url.to_firestore_value());
    f.insert(fields::PREVIEW_KEY.to_string(), record.preview_key.to_firestore_value());
    f.insert(fields::DURATION.to_string(), record.duration.to_firestore_value());
    f.insert(fields::CREATED_AT.to_string(), record.created_at.to_firestore_value());
    f.insert(fields::UPDATED_AT.to_string(), record.updated_at.to_firestore_value());
    f
}

/// Fields and update mask for a conditional update. `updated_at` is always
/// bumped.
fn video_update_to_fields(update: &VideoUpdate) -> (HashMap<String, Value>, Vec<String>) {
    let mut f = HashMap::new();

    if let Some(ref asset_id) = update.mux_asset_id {
        f.insert(fields::MUX_ASSET_ID.to_string(), asset_id.to_firestore_value());
    }
    if let Some(ref status) = update.mux_status {
        f.insert(fields::MUX_STATUS.to_string(), status.as_str().to_firestore_value());
    }
    if let Some(ref playback_id) = update.mux_playback_id {
        f.insert(fields::MUX_PLAYBACK_ID.to_string(), playback_id.to_firestore_value());
    }
    if let Some(ref track_id) = update.mux_track_id {
        f.insert(fields::MUX_TRACK_ID.to_string(), track_id.to_firestore_value());
    }
    if let Some(ref track_status) = update.mux_track_status {
        f.insert(fields::MUX_TRACK_STATUS.to_string(), track_status.to_firestore_value());
    }
    if let Some(ref thumb) = update.thumbnail {
        f.insert(fields::THUMBNAIL_URL.to_string(), thumb.url.to_firestore_value());
        f.insert(fields::THUMBNAIL_KEY.to_string(), thumb.key.to_firestore_value());
    }
    if let Some(ref preview) = update.preview {
        f.insert(fields::PREVIEW_URL.to_string(), preview.url.to_firestore_value());
        f.insert(fields::PREVIEW_KEY.to_string(), preview.key.to_firestore_value());
    }
    if let Some(duration) = update.duration {
        f.insert(fields::DURATION.to_string(), duration.to_firestore_value());
    }
    f.insert(fields::UPDATED_AT.to_string(), Utc::now().to_firestore_value());

    let mut mask: Vec<String> = update.field_paths().into_iter().map(String::from).collect();
    mask.push(fields::UPDATED_AT.to_string());

    (f, mask)
}

fn document_to_video_record(doc: &Document, id: VideoId) -> FirestoreResult<VideoRecord> {
    let fields_map = doc.fields.as_ref().ok_or_else(|| {
        FirestoreError::InvalidResponse("Document has no fields".to_string())
    })?;

    let get_opt_string = |key: &str| -> Option<String> {
        fields_map.get(key).and_then(String::from_firestore_value)
    };

    let mux_upload_id = get_opt_string(fields::MUX_UPLOAD_ID).ok_or_else(|| {
        FirestoreError::InvalidResponse(format!("Video {} has no {}", id, fields::MUX_UPLOAD_ID))
    })?;

    let now = Utc::now();
    let get_time = |key: &str| {
        fields_map
            .get(key)
            .and_then(chrono::DateTime::<Utc>::from_firestore_value)
            .unwrap_or(now)
    };

    Ok(VideoRecord {
        id,
        mux_upload_id,
        mux_asset_id: get_opt_string(fields::MUX_ASSET_ID),
        mux_status: get_opt_string(fields::MUX_STATUS)
            .map(AssetStatus::from)
            .unwrap_or_default(),
        mux_playback_id: get_opt_string(fields::MUX_PLAYBACK_ID),
        mux_track_id: get_opt_string(fields::MUX_TRACK_ID),
        mux_track_status: get_opt_string(fields::MUX_TRACK_STATUS),
        thumbnail_url: get_opt_string(fields::THUMBNAIL_URL),
        thumbnail_key: get_opt_string(fields::THUMBNAIL_KEY),
        preview_url: get_opt_string(fields::PREVIEW_URL),
        preview_key: get_opt_string(fields::PREVIEW_KEY),
        duration: fields_map
            .get(fields::DURATION)
            .and_then(i64::from_firestore_value)
            .unwrap_or(0),
        created_at: get_time(fields::CREATED_AT),
        updated_at: get_time(fields::UPDATED_AT),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use crate::retry::RetryConfig;
    use serde_json::json;
    use std::time::Duration;
    use vsync_models::MirroredAsset;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";

    async fn repo(server: &MockServer) -> VideoRecordRepository {
        repo_with_retries(server, 0).await
    }

    async fn repo_with_retries(server: &MockServer, max_retries: u32) -> VideoRecordRepository {
        let client = FirestoreClient::new(FirestoreConfig {
            project_id: "test-project".to_string(),
            database_id: "(default)".to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig {
                max_retries,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
            emulator_host: Some(server.address().to_string()),
        })
        .await
        .unwrap();
        VideoRecordRepository::new(client, "videos")
    }

    fn doc_json(id: &str, upload_id: &str) -> serde_json::Value {
        json!({
            "document": {
                "name": format!("projects/test-project/databases/(default)/documents/videos/{}", id),
                "fields": {
                    "mux_upload_id": { "stringValue": upload_id },
                    "mux_status": { "stringValue": "preparing" },
                    "duration": { "integerValue": "1500" }
                }
            }
        })
    }

    fn doc_at(id: &str, status: &str, playback_id: Option<&str>, update_time: &str) -> serde_json::Value {
        let mut doc = doc_json(id, "up-1");
        doc["document"]["fields"]["mux_status"] = json!({ "stringValue": status });
        if let Some(playback_id) = playback_id {
            doc["document"]["fields"]["mux_playback_id"] = json!({ "stringValue": playback_id });
        }
        doc["document"]["updateTime"] = json!(update_time);
        doc
    }

    async fn mount_query(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_update_fields_and_mask_agree() {
        let update = VideoUpdate::new()
            .status(AssetStatus::Ready)
            .preview(MirroredAsset {
                key: "k".into(),
                url: "u".into(),
            });
        let (f, mask) = video_update_to_fields(&update);

        assert_eq!(
            mask,
            vec!["mux_status", "preview_url", "preview_key", "updated_at"]
        );
        for path in &mask {
            assert!(f.contains_key(path), "{} missing from fields", path);
        }
        assert_eq!(f.len(), mask.len());
    }

    #[test]
    fn test_record_round_trips_through_document() {
        let mut record = VideoRecord::new("up-1");
        record.mux_asset_id = Some("asset-1".into());
        record.mux_status = AssetStatus::Other("migrating".into());
        record.duration = 42;

        let doc = Document::new(video_record_to_fields(&record));
        let back = document_to_video_record(&doc, record.id.clone()).unwrap();

        assert_eq!(back.mux_upload_id, "up-1");
        assert_eq!(back.mux_asset_id.as_deref(), Some("asset-1"));
        assert_eq!(back.mux_status, AssetStatus::Other("migrating".into()));
        assert!(back.mux_playback_id.is_none());
        assert_eq!(back.duration, 42);
    }

    #[tokio::test]
    async fn test_update_where_no_match_writes_nothing() {
        let server = MockServer::start().await;
        mount_query(&server, json!([{ "readTime": "2024-01-01T00:00:00Z" }])).await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let rows = repo(&server)
            .await
            .update_where(
                &CorrelationKey::UploadId("nope".into()),
                &VideoUpdate::new().status(AssetStatus::Errored),
            )
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_update_where_patches_matched_document() {
        let server = MockServer::start().await;
        mount_query(&server, json!([doc_json("vid-1", "up-1")])).await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/videos/vid-1", DOCS)))
            .and(query_param("currentDocument.exists", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/databases/(default)/documents/videos/vid-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = repo(&server)
            .await
            .update_where(
                &CorrelationKey::UploadId("up-1".into()),
                &VideoUpdate::new().asset_id("asset-1"),
            )
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_update_where_racing_delete_affects_nothing() {
        let server = MockServer::start().await;
        mount_query(&server, json!([doc_json("vid-1", "up-1")])).await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let rows = repo(&server)
            .await
            .update_where(
                &CorrelationKey::UploadId("up-1".into()),
                &VideoUpdate::new().status(AssetStatus::Ready),
            )
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        let server = MockServer::start().await;
        mount_query(&server, json!([doc_json("a", "dup"), doc_json("b", "dup")])).await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = repo(&server)
            .await
            .delete_where(&CorrelationKey::UploadId("dup".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousKey { matches: 2, .. }));
    }

    #[tokio::test]
    async fn test_find_by_asset_id() {
        let server = MockServer::start().await;
        mount_query(&server, json!([doc_json("vid-1", "up-1")])).await;

        let record = repo(&server)
            .await
            .find_by(&CorrelationKey::AssetId("asset-1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id.as_str(), "vid-1");
        assert_eq!(record.mux_status, AssetStatus::Preparing);
        assert_eq!(record.duration, 1500);
    }

    #[tokio::test]
    async fn test_guarded_update_is_conditioned_on_update_time() {
        let server = MockServer::start().await;
        mount_query(
            &server,
            json!([doc_at("vid-1", "preparing", None, "2024-05-01T10:00:00.000001Z")]),
        )
        .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/videos/vid-1", DOCS)))
            .and(query_param("currentDocument.updateTime", "2024-05-01T10:00:00.000001Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/databases/(default)/documents/videos/vid-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = repo(&server)
            .await
            .update_unless_ready(
                &CorrelationKey::UploadId("up-1".into()),
                &VideoUpdate::new().asset_id("asset-1").status(AssetStatus::Preparing),
            )
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_guarded_update_skips_ready_record() {
        let server = MockServer::start().await;
        mount_query(
            &server,
            json!([doc_at("vid-1", "ready", Some("pb-1"), "2024-05-01T10:00:00Z")]),
        )
        .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let rows = repo(&server)
            .await
            .update_unless_ready(
                &CorrelationKey::UploadId("up-1".into()),
                &VideoUpdate::new().status(AssetStatus::Preparing),
            )
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_guarded_update_loses_to_ready_written_in_between() {
        let server = MockServer::start().await;
        // First lookup sees the record before the ready write lands
        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([doc_at(
                "vid-1",
                "preparing",
                None,
                "2024-05-01T10:00:00Z"
            )])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_query(
            &server,
            json!([doc_at("vid-1", "ready", Some("pb-1"), "2024-05-01T10:00:01Z")]),
        )
        .await;
        Mock::given(method("PATCH"))
            .and(query_param("currentDocument.updateTime", "2024-05-01T10:00:00Z"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "status": "FAILED_PRECONDITION" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = repo(&server)
            .await
            .update_unless_ready(
                &CorrelationKey::UploadId("up-1".into()),
                &VideoUpdate::new().status(AssetStatus::Preparing),
            )
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_key_lookup_retries_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCS)))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_query(&server, json!([doc_json("vid-1", "up-1")])).await;

        let record = repo_with_retries(&server, 1)
            .await
            .find_by(&CorrelationKey::UploadId("up-1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id.as_str(), "vid-1");
    }

    #[tokio::test]
    async fn test_key_lookup_gives_up_on_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCS)))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = repo_with_retries(&server, 3)
            .await
            .find_by(&CorrelationKey::UploadId("up-1".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Firestore(FirestoreError::PermissionDenied(_))
        ));
    }
}
