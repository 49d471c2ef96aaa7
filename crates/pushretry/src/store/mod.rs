//! Per-item retry state
//!
//! The store is the only mutable state the retry core shares between tasks.
//! Every operation is scoped to a single item id; no cross-item transactions
//! are needed.
//!
//! Two implementations are provided:
//! - [`MemoryStore`] for tests and single-process deployments that accept
//!   losing state on restart
//! - [`JsonFileStore`] which persists every mutation to a JSON document
//!
//! A record lives as long as it holds a retry in progress or the marker of
//! the item's last successful push. Markers are only dropped by
//! [`RetryStateStore::forget`], so the store holds at most one record per
//! live item; the content layer reports deletions through
//! `RetryOrchestrator::item_deleted`.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushretry_core::error::StoreError;
use pushretry_core::types::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Attempt count reported for items with no recorded state.
pub const DEFAULT_ATTEMPT_COUNT: u32 = 1;

/// Snapshot of an item's retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Attempt the next push will be counted as
    pub attempt_count: u32,

    /// When the pending delayed attempt fires, if one is pending
    pub next_fire_time: Option<DateTime<Utc>>,
}

/// Persistence for retry bookkeeping, keyed by item id.
///
/// Reads have no side effects. Write failures are returned to the caller,
/// never swallowed.
#[async_trait]
pub trait RetryStateStore: Send + Sync {
    /// Recorded attempt count, [`DEFAULT_ATTEMPT_COUNT`] when absent.
    async fn get_attempt_count(&self, item: &ItemId) -> StoreResult<u32>;

    /// Record the attempt count.
    async fn set_attempt_count(&self, item: &ItemId, count: u32) -> StoreResult<()>;

    /// Fire time of the pending delayed attempt.
    async fn get_next_fire_time(&self, item: &ItemId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Record (or with `None`, remove) the fire time.
    async fn set_next_fire_time(
        &self,
        item: &ItemId,
        fire_time: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Remove attempt count and fire time together. Idempotent.
    ///
    /// The last published marker is kept.
    async fn clear(&self, item: &ItemId) -> StoreResult<()>;

    /// Drop every stored field of `item`, the marker included. Idempotent.
    async fn forget(&self, item: &ItemId) -> StoreResult<()>;

    /// Record the marker of the latest successful push.
    async fn set_last_published_marker(&self, item: &ItemId, marker: &str) -> StoreResult<()>;

    /// Marker of the latest successful push.
    async fn get_last_published_marker(&self, item: &ItemId) -> StoreResult<Option<String>>;

    /// Attempt count and fire time, or `None` when neither is recorded.
    async fn retry_state(&self, item: &ItemId) -> StoreResult<Option<RetryState>>;

    /// Every item with a recorded fire time.
    async fn scheduled_items(&self) -> StoreResult<Vec<(ItemId, DateTime<Utc>)>>;
}

/// Stored fields for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ItemRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attempt_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_fire_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_published_marker: Option<String>,
}

impl ItemRecord {
    fn is_empty(&self) -> bool {
        self.attempt_count.is_none()
            && self.next_fire_time.is_none()
            && self.last_published_marker.is_none()
    }

    fn retry_state(&self) -> Option<RetryState> {
        if self.attempt_count.is_none() && self.next_fire_time.is_none() {
            return None;
        }
        Some(RetryState {
            attempt_count: self.attempt_count.unwrap_or(DEFAULT_ATTEMPT_COUNT),
            next_fire_time: self.next_fire_time,
        })
    }
}

/// Records of all items; shared by both store implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct RecordMap {
    records: BTreeMap<ItemId, ItemRecord>,
}

impl RecordMap {
    fn get(&self, item: &ItemId) -> Option<&ItemRecord> {
        self.records.get(item)
    }

    fn attempt_count(&self, item: &ItemId) -> u32 {
        self.get(item)
            .and_then(|r| r.attempt_count)
            .unwrap_or(DEFAULT_ATTEMPT_COUNT)
    }

    fn next_fire_time(&self, item: &ItemId) -> Option<DateTime<Utc>> {
        self.get(item).and_then(|r| r.next_fire_time)
    }

    fn marker(&self, item: &ItemId) -> Option<String> {
        self.get(item).and_then(|r| r.last_published_marker.clone())
    }

    fn retry_state(&self, item: &ItemId) -> Option<RetryState> {
        self.get(item).and_then(ItemRecord::retry_state)
    }

    fn scheduled(&self) -> Vec<(ItemId, DateTime<Utc>)> {
        self.records
            .iter()
            .filter_map(|(id, r)| r.next_fire_time.map(|t| (id.clone(), t)))
            .collect()
    }

    /// Apply `f` to the item's record, dropping records left empty.
    fn update(&mut self, item: &ItemId, f: impl FnOnce(&mut ItemRecord)) {
        let record = self.records.entry(item.clone()).or_default();
        f(record);
        if record.is_empty() {
            self.records.remove(item);
        }
    }

    fn set_attempt_count(&mut self, item: &ItemId, count: u32) {
        self.update(item, |r| r.attempt_count = Some(count));
    }

    fn set_next_fire_time(&mut self, item: &ItemId, fire_time: Option<DateTime<Utc>>) {
        self.update(item, |r| r.next_fire_time = fire_time);
    }

    fn clear(&mut self, item: &ItemId) {
        if self.records.contains_key(item) {
            self.update(item, |r| {
                r.attempt_count = None;
                r.next_fire_time = None;
            });
        }
    }

    fn forget(&mut self, item: &ItemId) {
        self.records.remove(item);
    }

    fn set_marker(&mut self, item: &ItemId, marker: &str) {
        self.update(item, |r| r.last_published_marker = Some(marker.to_string()));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.records.len()
    }
}
