//! The retry state machine
//!
//! [`RetryOrchestrator::attempt`] is the single entry point for both the
//! timer path (a fired delayed job) and the reconciliation sweep. Per item:
//!
//! ```text
//!            first failure / item update
//!   Idle ─────────────────────────────────▶ Scheduled
//!    ▲                                       │  │  │
//!    │ success (state cleared)               │  │  │ failure, attempts remain
//!    └───────────────────────────────────────┘  │  └──────▶ Scheduled
//!                                               │ failure, no attempts remain
//!                                               ▼
//!                                           Exhausted
//! ```
//!
//! Push and scheduling failures become events on the [`EventBus`]. Store and
//! content-source failures are returned to the caller because they leave
//! the bookkeeping in doubt.

use crate::collaborators::{ContentSource, PublishExecutor};
use crate::error::Result;
use crate::events::{EventBus, RetryEvent};
use crate::scheduler::{DelayScheduler, RetryJob};
use crate::store::RetryStateStore;
use chrono::{DateTime, Utc};
use pushretry_core::clock::{Clock, SystemClock};
use pushretry_core::config::RetryConfig;
use pushretry_core::error::ConfigError;
use pushretry_core::retry::RetryPolicy;
use pushretry_core::types::{Eligibility, ItemId, ItemStatus, ItemUpdate, PushError, PushReceipt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a call to [`RetryOrchestrator::attempt`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Already published through another path; nothing pushed, state cleared
    AlreadyResolved,

    /// The push succeeded and retry state was cleared
    Published {
        /// Reference reported by the executor
        external_reference: Option<String>,
        /// Attempt that succeeded
        attempt_count: u32,
    },

    /// The push failed and another attempt is pending
    Rescheduled {
        /// Attempt count recorded for the next try
        attempt_count: u32,
        /// When the next try fires
        fire_time: DateTime<Utc>,
    },

    /// The push failed and the retry could not be scheduled
    SchedulingFailed {
        /// Attempt count recorded for the next try
        attempt_count: u32,
    },

    /// The push failed on the last allowed attempt
    Exhausted {
        /// Final attempt count
        attempt_count: u32,
    },

    /// The push failed and the retry policy refused another attempt
    RetryDeclined {
        /// Attempt that failed
        attempt_count: u32,
    },
}

/// Why an item update did not lead to scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Automatic draft save
    Autosave,
    /// Revision record
    Revision,
    /// Status other than published
    NotPublished(ItemStatus),
    /// Content type that is not tracked
    UntrackedType(String),
}

/// What a call to [`RetryOrchestrator::item_updated`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    /// The update does not concern the retry core
    Ignored(IgnoreReason),

    /// Existing retry cleared; the eligibility check refused a new one
    Rejected(String),

    /// Existing retry cleared and a first delayed attempt scheduled
    Scheduled {
        /// When the attempt fires
        fire_time: DateTime<Utc>,
    },

    /// Existing retry cleared; scheduling the new attempt failed
    SchedulingFailed,
}

/// Read-only view of an item's position in the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStatus {
    /// No retry bookkeeping
    Idle,

    /// A delayed attempt is pending
    Scheduled {
        /// Attempt count the pending try will use
        attempt_count: u32,
        /// When it fires
        next_fire_time: DateTime<Utc>,
    },

    /// No attempt pending although the bound was not reached (policy
    /// declined, or scheduling failed)
    Halted {
        /// Recorded attempt count
        attempt_count: u32,
    },

    /// All attempts used
    Exhausted {
        /// Recorded attempt count
        attempt_count: u32,
    },
}

/// Drives retries for individual items.
///
/// Cheap to share: every collaborator is behind an `Arc`.
pub struct RetryOrchestrator {
    config: Arc<RetryConfig>,
    policy: Arc<dyn RetryPolicy>,
    store: Arc<dyn RetryStateStore>,
    scheduler: Arc<dyn DelayScheduler>,
    executor: Arc<dyn PublishExecutor>,
    content: Arc<dyn ContentSource>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl RetryOrchestrator {
    /// Create a builder
    pub fn builder() -> RetryOrchestratorBuilder {
        RetryOrchestratorBuilder::default()
    }

    /// The configuration in force.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The event bus outcomes are reported on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The retry state store.
    pub fn store(&self) -> &Arc<dyn RetryStateStore> {
        &self.store
    }

    /// The clock fire times are computed from.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The content layer.
    pub fn content(&self) -> &Arc<dyn ContentSource> {
        &self.content
    }

    /// Attempt to publish `item` and update its retry state.
    ///
    /// Invoked when a delayed job fires and by the reconciliation sweep.
    pub async fn attempt(&self, item: &ItemId) -> Result<AttemptOutcome> {
        if self.resolve_if_settled(item).await? {
            return Ok(AttemptOutcome::AlreadyResolved);
        }

        let attempt_count = self.store.get_attempt_count(item).await?;
        debug!(item_id = %item, attempt_count, "Pushing item");

        match self.executor.push(item).await {
            Ok(receipt) => self.on_push_success(item, receipt, attempt_count).await,
            Err(error) => self.on_push_failure(item, error, attempt_count).await,
        }
    }

    /// Clear leftover retry state of an item that is already published and
    /// has no pending attempt. Returns whether the item was settled.
    pub async fn resolve_if_settled(&self, item: &ItemId) -> Result<bool> {
        let status = self.content.publish_status(item).await?;
        if !status.is_settled() || self.store.get_next_fire_time(item).await?.is_some() {
            return Ok(false);
        }
        debug!(item_id = %item, "Item already published, nothing pending");
        self.clear_existing_retry(item).await?;
        Ok(true)
    }

    async fn on_push_success(
        &self,
        item: &ItemId,
        receipt: PushReceipt,
        attempt_count: u32,
    ) -> Result<AttemptOutcome> {
        if let Some(marker) = &receipt.marker {
            self.store.set_last_published_marker(item, marker).await?;
        }
        self.clear_existing_retry(item).await?;

        info!(
            item_id = %item,
            attempt_count,
            external_reference = receipt.external_reference.as_deref().unwrap_or(""),
            "Push succeeded"
        );
        self.events
            .emit(RetryEvent::RetrySuccess {
                item_id: item.clone(),
                external_reference: receipt.external_reference.clone(),
                attempt_count,
            })
            .await;

        Ok(AttemptOutcome::Published {
            external_reference: receipt.external_reference,
            attempt_count,
        })
    }

    async fn on_push_failure(
        &self,
        item: &ItemId,
        error: PushError,
        attempt_count: u32,
    ) -> Result<AttemptOutcome> {
        warn!(item_id = %item, attempt_count, error = %error, "Push failed");
        self.events
            .emit(RetryEvent::RetryFailure {
                item_id: item.clone(),
                error: error.message.clone(),
                attempt_count,
            })
            .await;

        let max_attempts = self.policy.max_attempts();
        let retry = self.policy.should_retry(item, attempt_count, &error);

        if retry && attempt_count < max_attempts {
            let next_attempt = attempt_count + 1;
            self.store.set_attempt_count(item, next_attempt).await?;
            return Ok(match self.schedule_retry(item).await? {
                Some(fire_time) => AttemptOutcome::Rescheduled {
                    attempt_count: next_attempt,
                    fire_time,
                },
                None => AttemptOutcome::SchedulingFailed {
                    attempt_count: next_attempt,
                },
            });
        }

        // Record the count even on a first attempt so the item reads as
        // exhausted or halted rather than idle
        self.scheduler.cancel(item).await;
        self.store.set_attempt_count(item, attempt_count).await?;
        self.store.set_next_fire_time(item, None).await?;

        if attempt_count >= max_attempts {
            warn!(item_id = %item, attempt_count, "Retries exhausted");
            Ok(AttemptOutcome::Exhausted { attempt_count })
        } else {
            info!(item_id = %item, attempt_count, "Retry policy declined another attempt");
            Ok(AttemptOutcome::RetryDeclined { attempt_count })
        }
    }

    /// Handle an "item updated" notification from the content layer.
    ///
    /// Any pending retry is dropped; if the item is eligible a first
    /// delayed attempt is scheduled one retry interval from now.
    pub async fn item_updated(&self, update: &ItemUpdate) -> Result<UpdateDecision> {
        if update.is_autosave {
            return Ok(UpdateDecision::Ignored(IgnoreReason::Autosave));
        }
        if update.is_revision {
            return Ok(UpdateDecision::Ignored(IgnoreReason::Revision));
        }
        if update.status != ItemStatus::Published {
            return Ok(UpdateDecision::Ignored(IgnoreReason::NotPublished(
                update.status.clone(),
            )));
        }
        if update.item_type != self.config.tracked_item_type {
            return Ok(UpdateDecision::Ignored(IgnoreReason::UntrackedType(
                update.item_type.clone(),
            )));
        }

        let item = &update.item_id;
        self.clear_existing_retry(item).await?;

        if let Eligibility::Rejected(reason) = self.config.check_schedule_eligibility(item) {
            debug!(item_id = %item, reason = %reason, "Item not eligible for retry scheduling");
            return Ok(UpdateDecision::Rejected(reason));
        }

        Ok(match self.schedule_retry(item).await? {
            Some(fire_time) => UpdateDecision::Scheduled { fire_time },
            None => UpdateDecision::SchedulingFailed,
        })
    }

    /// The content layer confirmed a push made through another path.
    pub async fn external_push_succeeded(&self, item: &ItemId) -> Result<()> {
        debug!(item_id = %item, "External push succeeded, clearing retry");
        self.clear_existing_retry(item).await
    }

    /// The content layer deleted `item`: cancel its job and drop every
    /// stored field, the last published marker included.
    pub async fn item_deleted(&self, item: &ItemId) -> Result<()> {
        debug!(item_id = %item, "Item deleted, forgetting retry state");
        self.scheduler.cancel(item).await;
        self.store.forget(item).await?;
        Ok(())
    }

    /// Cancel the pending job and remove attempt count and fire time.
    pub async fn clear_existing_retry(&self, item: &ItemId) -> Result<()> {
        self.scheduler.cancel(item).await;
        self.store.clear(item).await?;
        Ok(())
    }

    /// Where `item` stands in the state machine.
    pub async fn status(&self, item: &ItemId) -> Result<RetryStatus> {
        let Some(state) = self.store.retry_state(item).await? else {
            return Ok(RetryStatus::Idle);
        };
        Ok(match state.next_fire_time {
            Some(next_fire_time) => RetryStatus::Scheduled {
                attempt_count: state.attempt_count,
                next_fire_time,
            },
            None if state.attempt_count >= self.policy.max_attempts() => RetryStatus::Exhausted {
                attempt_count: state.attempt_count,
            },
            None => RetryStatus::Halted {
                attempt_count: state.attempt_count,
            },
        })
    }

    /// Re-install delayed jobs for every fire time found in the store.
    ///
    /// Jobs do not survive a restart, but their fire times do. Fire times
    /// already in the past fire immediately. Returns the number of jobs
    /// installed.
    pub async fn restore_pending(&self) -> Result<usize> {
        let mut restored = 0;
        for (item, fire_time) in self.store.scheduled_items().await? {
            if self.scheduler.is_scheduled(&item).await {
                continue;
            }
            match self.scheduler.schedule(RetryJob::new(item.clone(), fire_time)).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    self.store.set_next_fire_time(&item, None).await?;
                    self.report_scheduling_failure(&item, e.to_string()).await;
                }
            }
        }
        if restored > 0 {
            info!(restored, "Restored pending retries");
        }
        Ok(restored)
    }

    /// Cancel, persist the new fire time, then install the job.
    ///
    /// Returns `None` when the scheduler refused the job; the fire time is
    /// removed again and a scheduling failure is reported.
    async fn schedule_retry(&self, item: &ItemId) -> Result<Option<DateTime<Utc>>> {
        let fire_time = self
            .clock
            .now()
            .checked_add_signed(self.config.retry_delay())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "retry_interval",
                reason: "next fire time is out of range".into(),
            })?;

        self.scheduler.cancel(item).await;
        self.store.set_next_fire_time(item, Some(fire_time)).await?;

        match self.scheduler.schedule(RetryJob::new(item.clone(), fire_time)).await {
            Ok(()) => Ok(Some(fire_time)),
            Err(e) => {
                self.store.set_next_fire_time(item, None).await?;
                self.report_scheduling_failure(item, e.to_string()).await;
                Ok(None)
            }
        }
    }

    async fn report_scheduling_failure(&self, item: &ItemId, error_message: String) {
        warn!(item_id = %item, error = %error_message, "Could not schedule retry");
        self.events
            .emit(RetryEvent::SchedulingFailure {
                item_id: item.clone(),
                error_message,
            })
            .await;
    }
}

/// Builder for [`RetryOrchestrator`]
///
/// Store, scheduler, executor and content source are required. The
/// configuration defaults to [`RetryConfig::default`], the policy to the one
/// implied by the configuration, the clock to the system clock.
#[derive(Default)]
pub struct RetryOrchestratorBuilder {
    config: Option<Arc<RetryConfig>>,
    policy: Option<Arc<dyn RetryPolicy>>,
    store: Option<Arc<dyn RetryStateStore>>,
    scheduler: Option<Arc<dyn DelayScheduler>>,
    executor: Option<Arc<dyn PublishExecutor>>,
    content: Option<Arc<dyn ContentSource>>,
    events: Option<Arc<EventBus>>,
    clock: Option<Arc<dyn Clock>>,
}

impl RetryOrchestratorBuilder {
    /// Set the configuration
    pub fn config(mut self, config: impl Into<Arc<RetryConfig>>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Override the retry policy
    pub fn policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the state store
    pub fn store(mut self, store: Arc<dyn RetryStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the delay scheduler
    pub fn scheduler(mut self, scheduler: Arc<dyn DelayScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set the publish executor
    pub fn executor(mut self, executor: Arc<dyn PublishExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the content source
    pub fn content(mut self, content: Arc<dyn ContentSource>) -> Self {
        self.content = Some(content);
        self
    }

    /// Share an existing event bus
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and build the orchestrator
    pub fn build(self) -> std::result::Result<RetryOrchestrator, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let policy = self.policy.unwrap_or_else(|| config.retry_policy());

        Ok(RetryOrchestrator {
            policy,
            store: self.store.ok_or(ConfigError::Missing("store"))?,
            scheduler: self.scheduler.ok_or(ConfigError::Missing("scheduler"))?,
            executor: self.executor.ok_or(ConfigError::Missing("executor"))?,
            content: self.content.ok_or(ConfigError::Missing("content source"))?,
            events: self.events.unwrap_or_default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockContentSource, MockPublishExecutor, SourceError};
    use crate::error::RetryError;
    use crate::store::{MemoryStore, RetryState, StoreResult};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pushretry_core::clock::ManualClock;
    use pushretry_core::error::{SchedulingError, StoreError};
    use pushretry_core::types::PublishStatus;
    use std::sync::Mutex;

    /// Scheduler that records calls instead of spawning timers.
    #[derive(Default)]
    struct RecordingScheduler {
        pending: Mutex<Vec<RetryJob>>,
        cancelled: Mutex<Vec<ItemId>>,
        refuse: bool,
    }

    #[async_trait]
    impl DelayScheduler for RecordingScheduler {
        async fn schedule(&self, job: RetryJob) -> std::result::Result<(), SchedulingError> {
            if self.refuse {
                return Err(SchedulingError::Closed);
            }
            let mut pending = self.pending.lock().unwrap();
            if pending.iter().any(|j| j.item_id == job.item_id) {
                return Err(SchedulingError::AlreadyScheduled(job.item_id));
            }
            pending.push(job);
            Ok(())
        }

        async fn cancel(&self, item: &ItemId) {
            self.pending.lock().unwrap().retain(|j| &j.item_id != item);
            self.cancelled.lock().unwrap().push(item.clone());
        }

        async fn is_scheduled(&self, item: &ItemId) -> bool {
            self.pending.lock().unwrap().iter().any(|j| &j.item_id == item)
        }

        async fn pending_count(&self) -> usize {
            self.pending.lock().unwrap().len()
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl RetryStateStore for ReadOnlyStore {
        async fn get_attempt_count(&self, item: &ItemId) -> StoreResult<u32> {
            self.0.get_attempt_count(item).await
        }
        async fn set_attempt_count(&self, _: &ItemId, _: u32) -> StoreResult<()> {
            Err(StoreError::Backend("read-only".into()))
        }
        async fn get_next_fire_time(&self, item: &ItemId) -> StoreResult<Option<DateTime<Utc>>> {
            self.0.get_next_fire_time(item).await
        }
        async fn set_next_fire_time(&self, _: &ItemId, _: Option<DateTime<Utc>>) -> StoreResult<()> {
            Err(StoreError::Backend("read-only".into()))
        }
        async fn clear(&self, _: &ItemId) -> StoreResult<()> {
            Err(StoreError::Backend("read-only".into()))
        }
        async fn set_last_published_marker(&self, _: &ItemId, _: &str) -> StoreResult<()> {
            Err(StoreError::Backend("read-only".into()))
        }
        async fn forget(&self, _: &ItemId) -> StoreResult<()> {
            Err(StoreError::Backend("read-only".into()))
        }
        async fn get_last_published_marker(&self, item: &ItemId) -> StoreResult<Option<String>> {
            self.0.get_last_published_marker(item).await
        }
        async fn retry_state(&self, item: &ItemId) -> StoreResult<Option<RetryState>> {
            self.0.retry_state(item).await
        }
        async fn scheduled_items(&self) -> StoreResult<Vec<(ItemId, DateTime<Utc>)>> {
            self.0.scheduled_items().await
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn content_with(status: PublishStatus) -> MockContentSource {
        let mut content = MockContentSource::new();
        content
            .expect_publish_status()
            .returning(move |_| Ok(status.clone()));
        content
    }

    fn orchestrator(
        executor: MockPublishExecutor,
        content: MockContentSource,
        store: Arc<dyn RetryStateStore>,
        scheduler: Arc<RecordingScheduler>,
    ) -> RetryOrchestrator {
        RetryOrchestrator::builder()
            .executor(Arc::new(executor))
            .content(Arc::new(content))
            .store(store)
            .scheduler(scheduler)
            .clock(Arc::new(ManualClock::new(t0())))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_settled_item_never_pushes() {
        let mut executor = MockPublishExecutor::new();
        executor.expect_push().never();

        let store = Arc::new(MemoryStore::new());
        let item = ItemId::new("a");
        store.set_attempt_count(&item, 2).await.unwrap();

        let scheduler = Arc::new(RecordingScheduler::default());
        let orch = orchestrator(
            executor,
            content_with(PublishStatus::confirmed("an-1")),
            store.clone(),
            scheduler.clone(),
        );

        assert_eq!(orch.attempt(&item).await.unwrap(), AttemptOutcome::AlreadyResolved);
        assert_eq!(store.retry_state(&item).await.unwrap(), None);
        assert_eq!(*scheduler.cancelled.lock().unwrap(), vec![item]);
    }

    #[tokio::test]
    async fn test_pending_fire_time_prevents_short_circuit() {
        let mut executor = MockPublishExecutor::new();
        executor
            .expect_push()
            .times(1)
            .returning(|_| Ok(PushReceipt::new("https://news.example/a", "rev-2")));

        let store = Arc::new(MemoryStore::new());
        let item = ItemId::new("a");
        store.set_next_fire_time(&item, Some(t0())).await.unwrap();

        let orch = orchestrator(
            executor,
            content_with(PublishStatus::confirmed("an-1")),
            store.clone(),
            Arc::new(RecordingScheduler::default()),
        );

        assert!(matches!(
            orch.attempt(&item).await.unwrap(),
            AttemptOutcome::Published { attempt_count: 1, .. }
        ));
        assert_eq!(
            store.get_last_published_marker(&item).await.unwrap().as_deref(),
            Some("rev-2")
        );
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut executor = MockPublishExecutor::new();
        executor
            .expect_push()
            .returning(|_| Err(PushError::transient("timeout")));

        let orch = orchestrator(
            executor,
            content_with(PublishStatus::unpublished()),
            Arc::new(ReadOnlyStore(MemoryStore::new())),
            Arc::new(RecordingScheduler::default()),
        );

        let err = orch.attempt(&ItemId::new("a")).await.unwrap_err();
        assert!(matches!(err, RetryError::Store(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_source_failure_propagates_without_push() {
        let mut executor = MockPublishExecutor::new();
        executor.expect_push().never();

        let mut content = MockContentSource::new();
        content
            .expect_publish_status()
            .returning(|id| Err(SourceError::NotFound(id.clone())));

        let orch = orchestrator(
            executor,
            content,
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingScheduler::default()),
        );

        let err = orch.attempt(&ItemId::new("gone")).await.unwrap_err();
        assert!(matches!(err, RetryError::Source(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_scheduling_failure_keeps_bookkeeping() {
        let mut executor = MockPublishExecutor::new();
        executor
            .expect_push()
            .returning(|_| Err(PushError::transient("rate limited")));

        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler {
            refuse: true,
            ..Default::default()
        });
        let orch = orchestrator(
            executor,
            content_with(PublishStatus::unpublished()),
            store.clone(),
            scheduler,
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        orch.events()
            .subscribe_all(move |e| sink.lock().unwrap().push(e.kind()))
            .await;

        let item = ItemId::new("a");
        assert_eq!(
            orch.attempt(&item).await.unwrap(),
            AttemptOutcome::SchedulingFailed { attempt_count: 2 }
        );
        assert_eq!(
            store.retry_state(&item).await.unwrap(),
            Some(RetryState {
                attempt_count: 2,
                next_fire_time: None,
            })
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                crate::events::EventKind::RetryFailure,
                crate::events::EventKind::SchedulingFailure
            ]
        );
        assert_eq!(
            orch.status(&item).await.unwrap(),
            RetryStatus::Halted { attempt_count: 2 }
        );
    }

    #[tokio::test]
    async fn test_builder_requires_collaborators() {
        let err = RetryOrchestrator::builder()
            .store(Arc::new(MemoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::Missing("scheduler"));
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let mut config = RetryConfig::default();
        config.retry_interval = std::time::Duration::from_secs(1 << 53);

        let err = RetryOrchestrator::builder()
            .config(config)
            .store(Arc::new(MemoryStore::new()))
            .scheduler(Arc::new(RecordingScheduler::default()))
            .executor(Arc::new(MockPublishExecutor::new()))
            .content(Arc::new(MockContentSource::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "retry_interval",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fire_time_overflow_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        let orch = RetryOrchestrator::builder()
            .store(store.clone())
            .scheduler(Arc::new(RecordingScheduler::default()))
            .executor(Arc::new(MockPublishExecutor::new()))
            .content(Arc::new(MockContentSource::new()))
            .clock(Arc::new(ManualClock::new(DateTime::<Utc>::MAX_UTC)))
            .build()
            .unwrap();

        let item = ItemId::new("a");
        let err = orch
            .item_updated(&ItemUpdate::published("a", "post"))
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Config(_)));
        assert_eq!(store.retry_state(&item).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_item_deleted_forgets_marker() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let item = ItemId::new("a");
        store.set_attempt_count(&item, 2).await.unwrap();
        store.set_last_published_marker(&item, "rev-3").await.unwrap();

        let orch = orchestrator(
            MockPublishExecutor::new(),
            MockContentSource::new(),
            store.clone(),
            scheduler.clone(),
        );

        orch.item_deleted(&item).await.unwrap();
        assert_eq!(store.retry_state(&item).await.unwrap(), None);
        assert_eq!(store.get_last_published_marker(&item).await.unwrap(), None);
        assert_eq!(*scheduler.cancelled.lock().unwrap(), vec![item]);
    }

    #[tokio::test]
    async fn test_restore_pending_reinstalls_jobs() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let a = ItemId::new("a");
        let b = ItemId::new("b");
        store.set_next_fire_time(&a, Some(t0())).await.unwrap();
        store.set_next_fire_time(&b, Some(t0())).await.unwrap();
        scheduler.schedule(RetryJob::new(b.clone(), t0())).await.unwrap();

        let orch = orchestrator(
            MockPublishExecutor::new(),
            MockContentSource::new(),
            store,
            scheduler.clone(),
        );

        assert_eq!(orch.restore_pending().await.unwrap(), 1);
        assert!(scheduler.is_scheduled(&a).await);
        assert_eq!(scheduler.pending_count().await, 2);
    }
}
