use super::{RecordMap, RetryState, RetryStateStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushretry_core::types::ItemId;
use tokio::sync::RwLock;

/// In-process store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<RecordMap>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetryStateStore for MemoryStore {
    async fn get_attempt_count(&self, item: &ItemId) -> StoreResult<u32> {
        Ok(self.records.read().await.attempt_count(item))
    }

    async fn set_attempt_count(&self, item: &ItemId, count: u32) -> StoreResult<()> {
        self.records.write().await.set_attempt_count(item, count);
        Ok(())
    }

    async fn get_next_fire_time(&self, item: &ItemId) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.records.read().await.next_fire_time(item))
    }

    async fn set_next_fire_time(
        &self,
        item: &ItemId,
        fire_time: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.records.write().await.set_next_fire_time(item, fire_time);
        Ok(())
    }

    async fn clear(&self, item: &ItemId) -> StoreResult<()> {
        self.records.write().await.clear(item);
        Ok(())
    }

    async fn forget(&self, item: &ItemId) -> StoreResult<()> {
        self.records.write().await.forget(item);
        Ok(())
    }

    async fn set_last_published_marker(&self, item: &ItemId, marker: &str) -> StoreResult<()> {
        self.records.write().await.set_marker(item, marker);
        Ok(())
    }

    async fn get_last_published_marker(&self, item: &ItemId) -> StoreResult<Option<String>> {
        Ok(self.records.read().await.marker(item))
    }

    async fn retry_state(&self, item: &ItemId) -> StoreResult<Option<RetryState>> {
        Ok(self.records.read().await.retry_state(item))
    }

    async fn scheduled_items(&self) -> StoreResult<Vec<(ItemId, DateTime<Utc>)>> {
        Ok(self.records.read().await.scheduled())
    }
}
