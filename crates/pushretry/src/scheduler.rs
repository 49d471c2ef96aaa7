//! Single-shot delayed jobs, at most one per item
//!
//! The [`DelayScheduler`] trait is the seam between the orchestrator and the
//! timer mechanism. [`TokioDelayScheduler`] implements it with one sleeping
//! tokio task per job; when a job fires it is delivered on an mpsc channel
//! that [`RetryService`](crate::service::RetryService) drains.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushretry_core::clock::Clock;
use pushretry_core::error::SchedulingError;
use pushretry_core::types::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Payload of a delayed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryJob {
    /// Item to attempt when the job fires
    pub item_id: ItemId,

    /// When the job is due
    pub fire_time: DateTime<Utc>,
}

impl RetryJob {
    /// Create a job.
    pub fn new(item_id: ItemId, fire_time: DateTime<Utc>) -> Self {
        Self { item_id, fire_time }
    }
}

/// Schedules and cancels single-shot delayed jobs keyed by item id.
///
/// A second `schedule` for an id with a pending job is refused with
/// [`SchedulingError::AlreadyScheduled`]; callers cancel first.
#[async_trait]
pub trait DelayScheduler: Send + Sync {
    /// Install a job that fires at `job.fire_time`.
    async fn schedule(&self, job: RetryJob) -> Result<(), SchedulingError>;

    /// Remove the pending job for `item`. Cancelling nothing is a no-op.
    async fn cancel(&self, item: &ItemId);

    /// Whether a job for `item` is pending.
    async fn is_scheduled(&self, item: &ItemId) -> bool;

    /// Number of pending jobs.
    async fn pending_count(&self) -> usize;
}

struct PendingJob {
    generation: u64,
    fire_time: DateTime<Utc>,
    handle: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<ItemId, PendingJob>>>;

/// Tokio-backed scheduler.
///
/// Each job is a spawned task sleeping until its fire time (fire times in
/// the past fire immediately). The registry tags every job with a
/// generation number so a job that fires concurrently with its own
/// replacement only removes itself.
pub struct TokioDelayScheduler {
    registry: Registry,
    fired: mpsc::UnboundedSender<RetryJob>,
    clock: Arc<dyn Clock>,
    max_pending: usize,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl TokioDelayScheduler {
    /// Create a scheduler and the receiver on which fired jobs arrive.
    pub fn new(
        clock: Arc<dyn Clock>,
        max_pending: usize,
    ) -> (Self, mpsc::UnboundedReceiver<RetryJob>) {
        let (fired, receiver) = mpsc::unbounded_channel();
        let scheduler = Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            fired,
            clock,
            max_pending,
            next_generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        };
        (scheduler, receiver)
    }

    /// Fire time of the pending job for `item`.
    pub async fn fire_time(&self, item: &ItemId) -> Option<DateTime<Utc>> {
        self.registry.lock().await.get(item).map(|job| job.fire_time)
    }

    /// Abort every pending job and refuse new ones.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut registry = self.registry.lock().await;
        for (_, job) in registry.drain() {
            job.handle.abort();
        }
        tracing::debug!("Delay scheduler shut down");
    }
}

#[async_trait]
impl DelayScheduler for TokioDelayScheduler {
    async fn schedule(&self, job: RetryJob) -> Result<(), SchedulingError> {
        if self.closed.load(Ordering::SeqCst) || self.fired.is_closed() {
            return Err(SchedulingError::Closed);
        }

        let mut registry = self.registry.lock().await;
        if registry.contains_key(&job.item_id) {
            return Err(SchedulingError::AlreadyScheduled(job.item_id));
        }
        if registry.len() >= self.max_pending {
            return Err(SchedulingError::CapacityExceeded {
                limit: self.max_pending,
            });
        }

        let delay = (job.fire_time - self.clock.now())
            .to_std()
            .unwrap_or_default();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let item_id = job.item_id.clone();
        let fire_time = job.fire_time;

        let handle = {
            let registry = Arc::clone(&self.registry);
            let fired = self.fired.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;

                {
                    let mut registry = registry.lock().await;
                    match registry.get(&job.item_id) {
                        Some(pending) if pending.generation == generation => {
                            registry.remove(&job.item_id);
                        }
                        // Cancelled or replaced while we were waking up
                        _ => return,
                    }
                }

                let item_id = job.item_id.clone();
                if fired.send(job).is_err() {
                    tracing::warn!(item_id = %item_id, "Retry fired after consumer shut down");
                }
            })
        };

        tracing::debug!(
            item_id = %item_id,
            fire_time = %fire_time,
            delay_ms = delay.as_millis() as u64,
            "Scheduled delayed retry"
        );

        registry.insert(
            item_id,
            PendingJob {
                generation,
                fire_time,
                handle,
            },
        );
        Ok(())
    }

    async fn cancel(&self, item: &ItemId) {
        if let Some(job) = self.registry.lock().await.remove(item) {
            job.handle.abort();
            tracing::debug!(item_id = %item, "Cancelled delayed retry");
        }
    }

    async fn is_scheduled(&self, item: &ItemId) -> bool {
        self.registry.lock().await.contains_key(item)
    }

    async fn pending_count(&self) -> usize {
        self.registry.lock().await.len()
    }
}

impl Drop for TokioDelayScheduler {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.try_lock() {
            for (_, job) in registry.drain() {
                job.handle.abort();
            }
        }
    }
}
