//! Outcome events and explicit subscription
//!
//! The orchestrator reports every outcome on an [`EventBus`]. Collaborators
//! (notification channels, dashboards, logging) subscribe typed handlers at
//! startup and keep the returned [`SubscriptionHandle`] to unsubscribe.
//! Delivery is fire-and-forget: handlers return nothing and cannot stop the
//! retry flow.

use pushretry_core::types::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An outcome reported by the retry core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryEvent {
    /// A push succeeded
    RetrySuccess {
        /// The item
        item_id: ItemId,
        /// Reference to the published copy, when the executor reported one
        external_reference: Option<String>,
        /// Attempt that succeeded
        attempt_count: u32,
    },

    /// A push failed
    RetryFailure {
        /// The item
        item_id: ItemId,
        /// Failure message from the executor
        error: String,
        /// Attempt that failed
        attempt_count: u32,
    },

    /// The delay mechanism refused a job; the item will not be retried
    /// automatically
    SchedulingFailure {
        /// The item
        item_id: ItemId,
        /// Why scheduling failed
        error_message: String,
    },
}

impl RetryEvent {
    /// The kind used for subscriptions.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RetrySuccess { .. } => EventKind::RetrySuccess,
            Self::RetryFailure { .. } => EventKind::RetryFailure,
            Self::SchedulingFailure { .. } => EventKind::SchedulingFailure,
        }
    }

    /// The item the event is about.
    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::RetrySuccess { item_id, .. }
            | Self::RetryFailure { item_id, .. }
            | Self::SchedulingFailure { item_id, .. } => item_id,
        }
    }
}

/// Event kinds a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// [`RetryEvent::RetrySuccess`]
    RetrySuccess,
    /// [`RetryEvent::RetryFailure`]
    RetryFailure,
    /// [`RetryEvent::SchedulingFailure`]
    SchedulingFailure,
}

impl EventKind {
    /// Every kind.
    pub const ALL: [EventKind; 3] = [
        EventKind::RetrySuccess,
        EventKind::RetryFailure,
        EventKind::SchedulingFailure,
    ];
}

/// Shared handler type.
pub type EventHandler = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

/// Handle for a registered handler (allows unsubscribing)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: String,
    kinds: Vec<EventKind>,
}

impl SubscriptionHandle {
    /// Kinds the handler was registered for.
    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }
}

/// Registry of event handlers
///
/// Handlers are called in registration order. The handler list is cloned
/// before dispatch so handlers may subscribe or unsubscribe without
/// deadlocking.
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(String, EventHandler)>>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for one event kind
    pub async fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.subscribe_many(&[kind], handler).await
    }

    /// Register a handler for every event kind
    pub async fn subscribe_all<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.subscribe_many(&EventKind::ALL, handler).await
    }

    async fn subscribe_many<F>(&self, kinds: &[EventKind], handler: F) -> SubscriptionHandle
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let id = uuid::Uuid::new_v4().to_string();

        let mut handlers = self.handlers.write().await;
        for kind in kinds {
            handlers
                .entry(*kind)
                .or_default()
                .push((id.clone(), Arc::clone(&handler)));
        }

        SubscriptionHandle {
            id,
            kinds: kinds.to_vec(),
        }
    }

    /// Remove a handler
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut handlers = self.handlers.write().await;
        for kind in &handle.kinds {
            if let Some(list) = handlers.get_mut(kind) {
                list.retain(|(id, _)| id != &handle.id);
            }
        }
    }

    /// Deliver an event to every handler subscribed to its kind
    pub async fn emit(&self, event: RetryEvent) {
        let targets = match self.handlers.read().await.get(&event.kind()) {
            Some(list) => list.clone(),
            None => return,
        };

        for (_id, handler) in targets {
            handler(&event);
        }
    }

    /// Number of handlers registered for `kind`
    pub async fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .await
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
