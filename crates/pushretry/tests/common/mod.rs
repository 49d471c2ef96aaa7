//! Shared fixtures for the integration tests

#![allow(dead_code)]

pub mod mock_collaborators;

pub use mock_collaborators::{MockContent, MockPublisher, RecordingScheduler};

use chrono::{DateTime, TimeZone, Utc};
use pushretry::events::RetryEvent;
use pushretry::orchestrator::RetryOrchestrator;
use pushretry::store::MemoryStore;
use pushretry_core::clock::ManualClock;
use pushretry_core::config::RetryConfig;
use std::sync::{Arc, Mutex};

/// Fixed start instant for every test clock
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Orchestrator wired to mocks, with every emitted event recorded.
pub struct Harness {
    pub orchestrator: Arc<RetryOrchestrator>,
    pub publisher: MockPublisher,
    pub content: MockContent,
    pub scheduler: RecordingScheduler,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    events: Arc<Mutex<Vec<RetryEvent>>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(RetryConfig::default()).await
    }

    pub async fn with_config(config: RetryConfig) -> Self {
        let publisher = MockPublisher::new();
        let content = MockContent::new();
        let scheduler = RecordingScheduler::new();
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(t0());

        let orchestrator = RetryOrchestrator::builder()
            .config(config)
            .executor(Arc::new(publisher.clone()))
            .content(Arc::new(content.clone()))
            .scheduler(Arc::new(scheduler.clone()))
            .store(store.clone())
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        orchestrator
            .events()
            .subscribe_all(move |event| sink.lock().unwrap().push(event.clone()))
            .await;

        Self {
            orchestrator: Arc::new(orchestrator),
            publisher,
            content,
            scheduler,
            store,
            clock,
            events,
        }
    }

    /// Events emitted so far, draining the log
    pub fn take_events(&self) -> Vec<RetryEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}
