use super::{RecordMap, RetryState, RetryStateStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushretry_core::error::StoreError;
use pushretry_core::types::ItemId;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Durable store backed by a single JSON document.
///
/// Every mutation is applied to a copy of the records, written to a sibling
/// temporary file and renamed over the target. The in-memory view only
/// changes once the write succeeded, so a failed write leaves both the file
/// and the store as they were.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<RecordMap>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => RecordMap::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Serialization(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RecordMap::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), "Opened retry state file");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn mutate(&self, f: impl FnOnce(&mut RecordMap)) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        f(&mut next);
        if next == *records {
            return Ok(());
        }
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn persist(&self, records: &RecordMap) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RetryStateStore for JsonFileStore {
    async fn get_attempt_count(&self, item: &ItemId) -> StoreResult<u32> {
        Ok(self.records.lock().await.attempt_count(item))
    }

    async fn set_attempt_count(&self, item: &ItemId, count: u32) -> StoreResult<()> {
        self.mutate(|r| r.set_attempt_count(item, count)).await
    }

    async fn get_next_fire_time(&self, item: &ItemId) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.records.lock().await.next_fire_time(item))
    }

    async fn set_next_fire_time(
        &self,
        item: &ItemId,
        fire_time: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.mutate(|r| r.set_next_fire_time(item, fire_time)).await
    }

    async fn clear(&self, item: &ItemId) -> StoreResult<()> {
        self.mutate(|r| r.clear(item)).await
    }

    async fn forget(&self, item: &ItemId) -> StoreResult<()> {
        self.mutate(|r| r.forget(item)).await
    }

    async fn set_last_published_marker(&self, item: &ItemId, marker: &str) -> StoreResult<()> {
        self.mutate(|r| r.set_marker(item, marker)).await
    }

    async fn get_last_published_marker(&self, item: &ItemId) -> StoreResult<Option<String>> {
        Ok(self.records.lock().await.marker(item))
    }

    async fn retry_state(&self, item: &ItemId) -> StoreResult<Option<RetryState>> {
        Ok(self.records.lock().await.retry_state(item))
    }

    async fn scheduled_items(&self) -> StoreResult<Vec<(ItemId, DateTime<Utc>)>> {
        Ok(self.records.lock().await.scheduled())
    }
}
