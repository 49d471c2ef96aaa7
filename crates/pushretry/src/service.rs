//! Wiring and background loops
//!
//! [`RetryService`] owns the tokio scheduler, the orchestrator and the sweep,
//! and runs two background tasks once started:
//!
//! - a dispatch loop that turns fired delayed jobs into attempts
//! - a sweep loop that runs the reconciliation sweep every sweep interval

use crate::collaborators::{ContentSource, PublishExecutor};
use crate::error::{Result, RetryError};
use crate::events::EventBus;
use crate::orchestrator::{AttemptOutcome, RetryOrchestrator, RetryStatus, UpdateDecision};
use crate::scheduler::{DelayScheduler, RetryJob, TokioDelayScheduler};
use crate::store::RetryStateStore;
use crate::sweep::{ReconciliationSweep, SweepReport};
use pushretry_core::clock::{Clock, SystemClock};
use pushretry_core::config::RetryConfig;
use pushretry_core::error::ConfigError;
use pushretry_core::types::{ItemId, ItemUpdate};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, error, info, warn};

/// How long shutdown waits for each background task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The assembled retry subsystem.
///
/// # Example
///
/// ```rust,no_run
/// # use pushretry::prelude::*;
/// # use std::sync::Arc;
/// # async fn run(executor: Arc<dyn PublishExecutor>, content: Arc<dyn ContentSource>) -> pushretry::Result<()> {
/// let service = RetryService::builder()
///     .config(RetryConfig::default())
///     .store(Arc::new(MemoryStore::new()))
///     .executor(executor)
///     .content(content)
///     .build()?;
///
/// service.start().await?;
/// service.item_updated(&ItemUpdate::published("42", "post")).await?;
/// service.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct RetryService {
    orchestrator: Arc<RetryOrchestrator>,
    scheduler: Arc<TokioDelayScheduler>,
    sweep: Arc<ReconciliationSweep>,
    fired: Mutex<Option<mpsc::UnboundedReceiver<RetryJob>>>,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RetryService {
    /// Create a builder
    pub fn builder() -> RetryServiceBuilder {
        RetryServiceBuilder::default()
    }

    /// Restore pending timers from the store and start the background loops.
    ///
    /// Calling `start` on a running (or shut down) service does nothing.
    pub async fn start(&self) -> Result<()> {
        if *self.shutdown_tx.borrow() {
            debug!("Retry service already shut down");
            return Ok(());
        }
        let Some(fired) = self.fired.lock().await.take() else {
            debug!("Retry service already started");
            return Ok(());
        };

        self.orchestrator.restore_pending().await?;

        let mut tasks = self.tasks.lock().await;
        tasks.push({
            let orchestrator = Arc::clone(&self.orchestrator);
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                Self::dispatch_loop(orchestrator, fired, shutdown).await;
            })
        });
        tasks.push({
            let sweep = Arc::clone(&self.sweep);
            let period = self.orchestrator.config().sweep_interval;
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                Self::sweep_loop(sweep, period, shutdown).await;
            })
        });

        self.running.store(true, Ordering::SeqCst);
        info!(
            sweep_interval_secs = self.orchestrator.config().sweep_interval.as_secs(),
            "Retry service started"
        );
        Ok(())
    }

    /// Turn fired jobs into attempts until shutdown.
    ///
    /// Attempts run concurrently; in-flight attempts are aborted when the
    /// loop exits.
    async fn dispatch_loop(
        orchestrator: Arc<RetryOrchestrator>,
        mut fired: mpsc::UnboundedReceiver<RetryJob>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                job = fired.recv() => {
                    let Some(job) = job else { break };
                    let orchestrator = Arc::clone(&orchestrator);
                    in_flight.spawn(async move {
                        if let Err(e) = orchestrator.attempt(&job.item_id).await {
                            error!(item_id = %job.item_id, error = %e, "Delayed retry failed");
                        }
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Retry attempt task panicked");
                    }
                }
            }
        }
        in_flight.shutdown().await;
        debug!("Dispatch loop stopped");
    }

    /// Run the sweep every `period`, first one period after start.
    async fn sweep_loop(
        sweep: Arc<ReconciliationSweep>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = sweep.run_once().await {
                        error!(error = %e, "Reconciliation sweep failed");
                    }
                }
            }
        }
        debug!("Sweep loop stopped");
    }

    /// Stop the background loops and abort pending timers.
    ///
    /// Fire times stay in the store so a later start can restore them.
    pub async fn shutdown(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
        self.scheduler.shutdown().await;

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            match timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(RetryError::Task(e.to_string())),
                Err(_) => warn!("Background task did not stop in time"),
            }
        }
        info!("Retry service stopped");
        Ok(())
    }

    /// Whether the background loops are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Forward an item update to the orchestrator.
    pub async fn item_updated(&self, update: &ItemUpdate) -> Result<UpdateDecision> {
        self.orchestrator.item_updated(update).await
    }

    /// Clear retry state after a push made through another path.
    pub async fn external_push_succeeded(&self, item: &ItemId) -> Result<()> {
        self.orchestrator.external_push_succeeded(item).await
    }

    /// Forget everything stored for a deleted item.
    pub async fn item_deleted(&self, item: &ItemId) -> Result<()> {
        self.orchestrator.item_deleted(item).await
    }

    /// Attempt `item` right away, outside any timer.
    pub async fn attempt_now(&self, item: &ItemId) -> Result<AttemptOutcome> {
        self.orchestrator.attempt(item).await
    }

    /// Run a sweep right away, outside the sweep loop.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        self.sweep.run_once().await
    }

    /// Where `item` stands in the state machine.
    pub async fn status(&self, item: &ItemId) -> Result<RetryStatus> {
        self.orchestrator.status(item).await
    }

    /// Number of delayed jobs waiting to fire.
    pub async fn pending_jobs(&self) -> usize {
        self.scheduler.pending_count().await
    }

    /// The event bus to subscribe on.
    pub fn events(&self) -> &Arc<EventBus> {
        self.orchestrator.events()
    }

    /// The underlying orchestrator.
    pub fn orchestrator(&self) -> &Arc<RetryOrchestrator> {
        &self.orchestrator
    }
}

impl Drop for RetryService {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for handle in tasks.drain(..) {
                handle.abort();
            }
        }
    }
}

/// Builder for [`RetryService`]
///
/// Store, executor and content source are required.
#[derive(Default)]
pub struct RetryServiceBuilder {
    config: Option<Arc<RetryConfig>>,
    store: Option<Arc<dyn RetryStateStore>>,
    executor: Option<Arc<dyn PublishExecutor>>,
    content: Option<Arc<dyn ContentSource>>,
    events: Option<Arc<EventBus>>,
    clock: Option<Arc<dyn Clock>>,
}

impl RetryServiceBuilder {
    /// Set the configuration
    pub fn config(mut self, config: impl Into<Arc<RetryConfig>>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Set the state store
    pub fn store(mut self, store: Arc<dyn RetryStateStore>) -> Self {
        self.store = Some(store);
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

    /// Assemble the service.
    pub fn build(self) -> std::result::Result<RetryService, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let (scheduler, fired) =
            TokioDelayScheduler::new(Arc::clone(&clock), config.max_pending_jobs);
        let scheduler = Arc::new(scheduler);

        let mut orchestrator = RetryOrchestrator::builder()
            .config(Arc::clone(&config))
            .store(self.store.ok_or(ConfigError::Missing("store"))?)
            .scheduler(Arc::clone(&scheduler) as Arc<dyn DelayScheduler>)
            .executor(self.executor.ok_or(ConfigError::Missing("executor"))?)
            .content(self.content.ok_or(ConfigError::Missing("content source"))?)
            .clock(clock);
        if let Some(events) = self.events {
            orchestrator = orchestrator.events(events);
        }
        let orchestrator = Arc::new(orchestrator.build()?);

        let (shutdown_tx, _) = watch::channel(false);

        Ok(RetryService {
            sweep: Arc::new(ReconciliationSweep::new(Arc::clone(&orchestrator))),
            orchestrator,
            scheduler,
            fired: Mutex::new(Some(fired)),
            shutdown_tx,
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }
}
