//! Interfaces to the systems the retry core depends on but does not own.
//!
//! The push operation and the content layer are external: the core only
//! talks to them through these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushretry_core::types::{ItemId, ItemSummary, PublishStatus, PushError, PushReceipt};

/// Error returned by the content layer when it cannot answer a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The item does not exist (deleted between the event and the attempt)
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// The content layer could not be reached or failed internally
    #[error("content source unavailable: {0}")]
    Unavailable(String),
}

/// Performs the actual push of an item's current content.
///
/// The push is synchronous from the retry core's point of view: the call
/// returns once the external service accepted or refused the item. Any
/// timeout is the executor's concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PublishExecutor: Send + Sync {
    /// Push the latest content of `item`.
    async fn push(&self, item: &ItemId) -> Result<PushReceipt, PushError>;
}

/// Read access to the content layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Current publish status of `item`.
    async fn publish_status(&self, item: &ItemId) -> Result<PublishStatus, SourceError>;

    /// Published items of the tracked type whose last modification falls
    /// between `after` and `before`.
    ///
    /// The sweep attempts whatever is returned, so implementations must
    /// filter on status and type themselves. They may over-select on time;
    /// the sweep re-checks the bounds.
    async fn query_recently_modified(
        &self,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<ItemSummary>, SourceError>;
}
