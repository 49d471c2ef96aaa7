//! Scriptable stand-ins for the publish executor, the content layer and the
//! delay scheduler.
//!
//! All mocks are cheap to clone and share their state, so a test can keep a
//! handle for assertions after passing a clone to the orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushretry::collaborators::{ContentSource, PublishExecutor, SourceError};
use pushretry::scheduler::{DelayScheduler, RetryJob};
use pushretry_core::error::SchedulingError;
use pushretry_core::types::{ItemId, ItemSummary, PublishStatus, PushError, PushReceipt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Executor that replays queued outcomes.
///
/// Once the queue is empty every push succeeds with a reference derived from
/// the item id and no marker.
#[derive(Clone, Default)]
pub struct MockPublisher {
    outcomes: Arc<Mutex<VecDeque<Result<PushReceipt, PushError>>>>,
    calls: Arc<Mutex<Vec<ItemId>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transient failure
    pub fn fail_with(&self, message: &str) -> &Self {
        self.push_outcome(Err(PushError::transient(message)))
    }

    /// Queue a permanent failure
    pub fn fail_permanently_with(&self, message: &str) -> &Self {
        self.push_outcome(Err(PushError::permanent(message)))
    }

    /// Queue a success
    pub fn succeed_with(&self, reference: &str, marker: &str) -> &Self {
        self.push_outcome(Ok(PushReceipt::new(reference, marker)))
    }

    fn push_outcome(&self, outcome: Result<PushReceipt, PushError>) -> &Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    /// Items pushed, in call order
    pub fn calls(&self) -> Vec<ItemId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PublishExecutor for MockPublisher {
    async fn push(&self, item: &ItemId) -> Result<PushReceipt, PushError> {
        self.calls.lock().unwrap().push(item.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(PushReceipt {
                    external_reference: Some(format!("https://news.example/{item}")),
                    marker: None,
                })
            })
    }
}

/// Content layer with per-item statuses and a fixed candidate list.
///
/// `query_recently_modified` returns every summary regardless of the
/// bounds, so callers must filter.
#[derive(Clone, Default)]
pub struct MockContent {
    statuses: Arc<Mutex<HashMap<ItemId, Result<PublishStatus, SourceError>>>>,
    summaries: Arc<Mutex<Vec<ItemSummary>>>,
    query_error: Arc<Mutex<Option<SourceError>>>,
    queries: Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>>,
}

impl MockContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, item: &str, status: PublishStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(ItemId::new(item), Ok(status));
    }

    pub fn fail_status(&self, item: &str, error: SourceError) {
        self.statuses
            .lock()
            .unwrap()
            .insert(ItemId::new(item), Err(error));
    }

    pub fn add_modified(&self, item: &str, modified: DateTime<Utc>) {
        self.summaries
            .lock()
            .unwrap()
            .push(ItemSummary::new(item, modified));
    }

    pub fn fail_queries(&self, error: SourceError) {
        *self.query_error.lock().unwrap() = Some(error);
    }

    /// Bounds of every query made so far
    pub fn queries(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSource for MockContent {
    async fn publish_status(&self, item: &ItemId) -> Result<PublishStatus, SourceError> {
        self.statuses
            .lock()
            .unwrap()
            .get(item)
            .cloned()
            .unwrap_or_else(|| Ok(PublishStatus::unpublished()))
    }

    async fn query_recently_modified(
        &self,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<ItemSummary>, SourceError> {
        self.queries.lock().unwrap().push((after, before));
        if let Some(error) = self.query_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.summaries.lock().unwrap().clone())
    }
}

/// Scheduler that only records jobs; nothing ever fires by itself.
#[derive(Clone, Default)]
pub struct RecordingScheduler {
    pending: Arc<Mutex<HashMap<ItemId, RetryJob>>>,
    refusal: Arc<Mutex<Option<SchedulingError>>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every following `schedule` call with `error`
    pub fn refuse_with(&self, error: SchedulingError) {
        *self.refusal.lock().unwrap() = Some(error);
    }

    pub fn job(&self, item: &str) -> Option<RetryJob> {
        self.pending.lock().unwrap().get(&ItemId::new(item)).cloned()
    }
}

#[async_trait]
impl DelayScheduler for RecordingScheduler {
    async fn schedule(&self, job: RetryJob) -> Result<(), SchedulingError> {
        if let Some(error) = self.refusal.lock().unwrap().clone() {
            return Err(error);
        }
        let mut pending = self.pending.lock().unwrap();
        if pending.contains_key(&job.item_id) {
            return Err(SchedulingError::AlreadyScheduled(job.item_id));
        }
        pending.insert(job.item_id.clone(), job);
        Ok(())
    }

    async fn cancel(&self, item: &ItemId) {
        self.pending.lock().unwrap().remove(item);
    }

    async fn is_scheduled(&self, item: &ItemId) -> bool {
        self.pending.lock().unwrap().contains_key(item)
    }

    async fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
