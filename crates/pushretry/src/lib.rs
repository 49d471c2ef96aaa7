//! # pushretry
//!
//! Bounded, delayed retries for pushing published items to an external
//! service, plus a periodic reconciliation sweep that catches items whose
//! delayed attempt was lost.
//!
//! ## Flow
//!
//! 1. The content layer reports an update ([`RetryService::item_updated`]).
//!    Eligible published items get a first delayed attempt one retry
//!    interval later.
//! 2. When the attempt fires, the orchestrator checks whether the item was
//!    already published through another path, then pushes through the
//!    [`PublishExecutor`].
//! 3. Failures reschedule until the attempt bound is reached. Every outcome
//!    is reported on the [`EventBus`].
//! 4. Every sweep interval, items modified inside a trailing window are
//!    re-driven.
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use chrono::{DateTime, Utc};
//! use pushretry::prelude::*;
//! use std::sync::Arc;
//!
//! struct Newsroom;
//!
//! #[async_trait]
//! impl PublishExecutor for Newsroom {
//!     async fn push(&self, item: &ItemId) -> Result<PushReceipt, PushError> {
//!         Ok(PushReceipt::new(format!("https://news.example/{item}"), "rev-1"))
//!     }
//! }
//!
//! #[async_trait]
//! impl ContentSource for Newsroom {
//!     async fn publish_status(&self, _item: &ItemId) -> Result<PublishStatus, SourceError> {
//!         Ok(PublishStatus::unpublished())
//!     }
//!
//!     async fn query_recently_modified(
//!         &self,
//!         _after: DateTime<Utc>,
//!         _before: DateTime<Utc>,
//!     ) -> Result<Vec<ItemSummary>, SourceError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # async fn run() -> pushretry::Result<()> {
//! let newsroom = Arc::new(Newsroom);
//! let service = RetryService::builder()
//!     .store(Arc::new(MemoryStore::new()))
//!     .executor(newsroom.clone())
//!     .content(newsroom)
//!     .build()?;
//!
//! log_events(service.events()).await;
//! service.start().await?;
//! service.item_updated(&ItemUpdate::published("42", "post")).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod collaborators;
pub mod error;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod sweep;

// Re-export commonly used types
pub use collaborators::{ContentSource, PublishExecutor, SourceError};
pub use error::{Result, RetryError};
pub use events::{EventBus, EventKind, RetryEvent, SubscriptionHandle};
pub use observability::log_events;
pub use orchestrator::{
    AttemptOutcome, IgnoreReason, RetryOrchestrator, RetryStatus, UpdateDecision,
};
pub use scheduler::{DelayScheduler, RetryJob, TokioDelayScheduler};
pub use service::{RetryService, RetryServiceBuilder};
pub use store::{JsonFileStore, MemoryStore, RetryState, RetryStateStore};
pub use sweep::{ReconciliationSweep, SweepReport, SweepWindow};

pub use pushretry_core;

/// Everything needed to wire up a service.
pub mod prelude {
    pub use crate::collaborators::{ContentSource, PublishExecutor, SourceError};
    pub use crate::events::{EventBus, EventKind, RetryEvent};
    pub use crate::observability::log_events;
    pub use crate::orchestrator::{AttemptOutcome, RetryStatus, UpdateDecision};
    pub use crate::service::RetryService;
    pub use crate::store::{JsonFileStore, MemoryStore, RetryStateStore};
    pub use pushretry_core::prelude::*;
}
