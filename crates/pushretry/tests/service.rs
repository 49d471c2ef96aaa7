//! End-to-end tests for the assembled service on a paused tokio clock

mod common;

use common::{MockContent, MockPublisher, t0};
use pretty_assertions::assert_eq;
use pushretry::events::RetryEvent;
use pushretry::orchestrator::UpdateDecision;
use pushretry::service::RetryService;
use pushretry::store::{MemoryStore, RetryStateStore};
use pushretry_core::clock::ManualClock;
use pushretry_core::config::RetryConfig;
use pushretry_core::types::{ItemId, ItemUpdate};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Fixture {
    service: RetryService,
    publisher: MockPublisher,
    content: MockContent,
    store: Arc<MemoryStore>,
    events: Arc<Mutex<Vec<RetryEvent>>>,
}

async fn fixture(config: RetryConfig, store: Arc<MemoryStore>) -> Fixture {
    let publisher = MockPublisher::new();
    let content = MockContent::new();

    let service = RetryService::builder()
        .config(config)
        .store(store.clone())
        .executor(Arc::new(publisher.clone()))
        .content(Arc::new(content.clone()))
        .clock(Arc::new(ManualClock::new(t0())))
        .build()
        .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    service
        .events()
        .subscribe_all(move |event| sink.lock().unwrap().push(event.clone()))
        .await;

    Fixture {
        service,
        publisher,
        content,
        store,
        events,
    }
}

/// Poll `condition` while letting virtual time run.
async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..5_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not met within 500 virtual seconds");
}

#[tokio::test(start_paused = true)]
async fn test_delayed_retry_runs_to_success() {
    let f = fixture(RetryConfig::default(), Arc::new(MemoryStore::new())).await;
    f.publisher
        .fail_with("rate limited")
        .succeed_with("https://news.example/A", "rev-7");

    f.service.start().await.unwrap();
    let decision = f
        .service
        .item_updated(&ItemUpdate::published("A", "post"))
        .await
        .unwrap();
    assert!(matches!(decision, UpdateDecision::Scheduled { .. }));
    assert_eq!(f.service.pending_jobs().await, 1);

    let events = Arc::clone(&f.events);
    eventually(move || events.lock().unwrap().len() == 2).await;

    let a = ItemId::new("A");
    assert_eq!(
        *f.events.lock().unwrap(),
        vec![
            RetryEvent::RetryFailure {
                item_id: a.clone(),
                error: "rate limited".into(),
                attempt_count: 1,
            },
            RetryEvent::RetrySuccess {
                item_id: a.clone(),
                external_reference: Some("https://news.example/A".into()),
                attempt_count: 2,
            },
        ]
    );
    assert_eq!(f.store.retry_state(&a).await.unwrap(), None);
    assert_eq!(f.service.pending_jobs().await, 0);

    f.service.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_restores_persisted_fire_times() {
    let store = Arc::new(MemoryStore::new());
    let r = ItemId::new("R");
    store
        .set_next_fire_time(&r, Some(t0() + chrono::Duration::seconds(60)))
        .await
        .unwrap();
    store.set_attempt_count(&r, 2).await.unwrap();

    let f = fixture(RetryConfig::default(), store).await;
    f.service.start().await.unwrap();
    assert_eq!(f.service.pending_jobs().await, 1);

    let publisher = f.publisher.clone();
    eventually(move || publisher.call_count() == 1).await;

    let events = Arc::clone(&f.events);
    eventually(move || !events.lock().unwrap().is_empty()).await;
    assert!(matches!(
        f.events.lock().unwrap()[0],
        RetryEvent::RetrySuccess {
            attempt_count: 2,
            ..
        }
    ));

    f.service.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sweep_loop_runs_each_interval() {
    let config = RetryConfig::builder()
        .sweep_interval(Duration::from_secs(60))
        .build()
        .unwrap();
    let f = fixture(config, Arc::new(MemoryStore::new())).await;
    f.content
        .add_modified("S", t0() - chrono::Duration::minutes(10));

    f.service.start().await.unwrap();
    assert!(f.content.queries().is_empty());

    let content = f.content.clone();
    eventually(move || content.queries().len() >= 2).await;
    assert!(f.publisher.call_count() >= 2);

    f.service.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent_and_shutdown_closes() {
    let f = fixture(RetryConfig::default(), Arc::new(MemoryStore::new())).await;

    f.service.start().await.unwrap();
    f.service.start().await.unwrap();
    assert!(f.service.is_running());

    f.service.shutdown().await.unwrap();
    assert!(!f.service.is_running());

    let decision = f
        .service
        .item_updated(&ItemUpdate::published("late", "post"))
        .await
        .unwrap();
    assert_eq!(decision, UpdateDecision::SchedulingFailed);

    // A stopped service stays stopped
    f.service.start().await.unwrap();
    assert!(!f.service.is_running());
}

#[tokio::test]
async fn test_build_rejects_missing_store() {
    let result = RetryService::builder()
        .executor(Arc::new(MockPublisher::new()))
        .content(Arc::new(MockContent::new()))
        .build();
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_item_deleted_drops_pending_retry_and_marker() {
    let f = fixture(RetryConfig::default(), Arc::new(MemoryStore::new())).await;
    let d = ItemId::new("D");
    f.store.set_last_published_marker(&d, "rev-1").await.unwrap();

    f.service.start().await.unwrap();
    f.service
        .item_updated(&ItemUpdate::published("D", "post"))
        .await
        .unwrap();
    assert_eq!(f.service.pending_jobs().await, 1);

    f.service.item_deleted(&d).await.unwrap();

    assert_eq!(f.service.pending_jobs().await, 0);
    assert_eq!(f.store.retry_state(&d).await.unwrap(), None);
    assert_eq!(f.store.get_last_published_marker(&d).await.unwrap(), None);

    f.service.shutdown().await.unwrap();
}
