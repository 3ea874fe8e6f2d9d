//! In-process record store.
//!
//! Used for local runs without Firestore and as a test double that honors the
//! same conditional-write semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use vsync_models::{CorrelationKey, VideoId, VideoRecord, VideoUpdate};

use crate::store::{StoreError, StoreResult, VideoStore};

/// [`VideoStore`] backed by a map guarded by a single lock.
#[derive(Default)]
pub struct MemoryVideoStore {
    records: RwLock<HashMap<VideoId, VideoRecord>>,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `records`.
    pub fn with_records(records: impl IntoIterator<Item = VideoRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }

    /// Snapshot of all records.
    pub async fn records(&self) -> Vec<VideoRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn matching_id(
        records: &HashMap<VideoId, VideoRecord>,
        key: &CorrelationKey,
    ) -> StoreResult<Option<VideoId>> {
        let mut ids = records.values().filter(|r| key.matches(r)).map(|r| r.id.clone());
        let first = ids.next();
        let rest = ids.count();
        if rest > 0 {
            return Err(StoreError::ambiguous(key, rest + 1));
        }
        Ok(first)
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn find_by(&self, key: &CorrelationKey) -> StoreResult<Option<VideoRecord>> {
        let records = self.records.read().await;
        Ok(Self::matching_id(&records, key)?.and_then(|id| records.get(&id).cloned()))
    }

    async fn update_where(&self, key: &CorrelationKey, update: &VideoUpdate) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let Some(id) = Self::matching_id(&records, key)? else {
            return Ok(0);
        };
        match records.get_mut(&id) {
            Some(record) => {
                update.apply_to(record);
                record.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_unless_ready(
        &self,
        key: &CorrelationKey,
        update: &VideoUpdate,
    ) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let Some(id) = Self::matching_id(&records, key)? else {
            return Ok(0);
        };
        match records.get_mut(&id) {
            Some(record) if !record.is_ready() => {
                update.apply_to(record);
                record.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_where(&self, key: &CorrelationKey) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let Some(id) = Self::matching_id(&records, key)? else {
            return Ok(0);
        };
        Ok(records.remove(&id).map_or(0, |_| 1))
    }

    async fn create(&self, record: &VideoRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.to_string()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn check_health(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsync_models::AssetStatus;

    fn upload(id: &str) -> CorrelationKey {
        CorrelationKey::UploadId(id.to_string())
    }

    #[tokio::test]
    async fn test_update_missing_key_affects_nothing() {
        let store = MemoryVideoStore::new();
        let rows = store
            .update_where(&upload("nope"), &VideoUpdate::new().status(AssetStatus::Ready))
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_then_find_by_asset_id() {
        let store = MemoryVideoStore::with_records([VideoRecord::new("up-1")]);
        let rows = store
            .update_where(&upload("up-1"), &VideoUpdate::new().asset_id("asset-1"))
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let found = store
            .find_by(&CorrelationKey::AssetId("asset-1".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.mux_upload_id, "up-1");
    }

    fn ready() -> VideoUpdate {
        VideoUpdate::new().status(AssetStatus::Ready).playback_id("pb-1")
    }

    #[tokio::test]
    async fn test_guarded_update_skips_ready_record() {
        let store = MemoryVideoStore::with_records([VideoRecord::new("up-1")]);
        store.update_where(&upload("up-1"), &ready()).await.unwrap();

        let rows = store
            .update_unless_ready(&upload("up-1"), &VideoUpdate::new().status(AssetStatus::Preparing))
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store.records().await[0].mux_status, AssetStatus::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ready_wins_over_guarded_update() {
        for _ in 0..50 {
            let store = std::sync::Arc::new(MemoryVideoStore::with_records([VideoRecord::new("up-1")]));

            let ready_task = {
                let store = store.clone();
                tokio::spawn(async move { store.update_where(&upload("up-1"), &ready()).await })
            };
            let created_task = {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update_unless_ready(
                            &upload("up-1"),
                            &VideoUpdate::new().status(AssetStatus::Preparing),
                        )
                        .await
                })
            };
            ready_task.await.unwrap().unwrap();
            created_task.await.unwrap().unwrap();

            assert!(store.records().await[0].is_ready());
        }
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryVideoStore::with_records([VideoRecord::new("up-1")]);
        assert_eq!(store.delete_where(&upload("up-1")).await.unwrap(), 1);
        assert_eq!(store.delete_where(&upload("up-1")).await.unwrap(), 0);

        // No resurrection after delete
        let rows = store
            .update_where(&upload("up-1"), &VideoUpdate::new().status(AssetStatus::Ready))
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_ambiguous() {
        let store = MemoryVideoStore::with_records([VideoRecord::new("dup"), VideoRecord::new("dup")]);
        let err = store.delete_where(&upload("dup")).await.unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousKey { matches: 2, .. }));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_existing_id() {
        let record = VideoRecord::new("up-1");
        let store = MemoryVideoStore::new();
        store.create(&record).await.unwrap();
        assert!(matches!(
            store.create(&record).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }
}
