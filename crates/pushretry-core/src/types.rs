//! Domain types shared by every pushretry crate.
//!
//! The core never owns items; it only refers to them by [`ItemId`] and
//! receives the few facts it needs (publish status, modification time)
//! from the content layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier of an item in the external content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create an item id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Editorial status carried by an item-updated notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Live content; the only status that triggers retry scheduling.
    Published,
    /// Work in progress
    Draft,
    /// Awaiting review
    Pending,
    /// Scheduled for future publication
    Future,
    /// Visible to editors only
    Private,
    /// Moved to the bin
    Trashed,
}

/// An "item updated" notification from the content layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    /// The item that changed
    pub item_id: ItemId,

    /// Status after the change
    pub status: ItemStatus,

    /// Content type, e.g. `"post"`
    pub item_type: String,

    /// Set when the change is an automatic draft save
    #[serde(default)]
    pub is_autosave: bool,

    /// Set when the change only produced a revision record
    #[serde(default)]
    pub is_revision: bool,
}

impl ItemUpdate {
    /// A regular edit of a published item.
    pub fn published(item_id: impl Into<ItemId>, item_type: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            status: ItemStatus::Published,
            item_type: item_type.into(),
            is_autosave: false,
            is_revision: false,
        }
    }

    /// Override the status.
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark the update as an autosave.
    pub fn autosave(mut self) -> Self {
        self.is_autosave = true;
        self
    }

    /// Mark the update as a revision.
    pub fn revision(mut self) -> Self {
        self.is_revision = true;
        self
    }
}

/// Item id plus modification time, as returned by the recently-modified query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    /// The item
    pub id: ItemId,

    /// When its content last changed
    pub last_modified_time: DateTime<Utc>,
}

impl ItemSummary {
    /// Create a summary.
    pub fn new(id: impl Into<ItemId>, last_modified_time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            last_modified_time,
        }
    }
}

/// The content layer's view of an item's publish state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStatus {
    /// Identifier assigned by the external publishing service, once confirmed
    pub external_id: Option<String>,

    /// A push is in flight and not yet confirmed
    pub pending: bool,
}

impl PublishStatus {
    /// Never published.
    pub fn unpublished() -> Self {
        Self::default()
    }

    /// Published and confirmed under `external_id`.
    pub fn confirmed(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            pending: false,
        }
    }

    /// Mark a push as in flight.
    pub fn with_pending(mut self, pending: bool) -> Self {
        self.pending = pending;
        self
    }

    /// Confirmed external id and nothing in flight.
    pub fn is_settled(&self) -> bool {
        self.external_id.is_some() && !self.pending
    }
}

/// What a successful push reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    /// Reference to the published copy (e.g. a share URL)
    pub external_reference: Option<String>,

    /// Opaque success token such as a revision id
    pub marker: Option<String>,
}

impl PushReceipt {
    /// Receipt with both reference and marker.
    pub fn new(external_reference: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            external_reference: Some(external_reference.into()),
            marker: Some(marker.into()),
        }
    }
}

/// Broad class of a push failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushErrorKind {
    /// Worth trying again later (rate limits, timeouts, outages)
    #[default]
    Transient,
    /// Will fail again with the same content
    Permanent,
}

/// A failed push, as reported by the publish executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct PushError {
    /// Human readable reason, forwarded verbatim in failure events
    pub message: String,

    /// Failure class
    #[serde(default)]
    pub kind: PushErrorKind,
}

impl PushError {
    /// A transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: PushErrorKind::Transient,
        }
    }

    /// A permanent failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: PushErrorKind::Permanent,
        }
    }

    /// Whether the failure is classified as permanent.
    pub fn is_permanent(&self) -> bool {
        self.kind == PushErrorKind::Permanent
    }
}

/// Outcome of an eligibility check.
///
/// Collaborators reject an item by returning [`Eligibility::Rejected`] with a
/// reason instead of signalling through an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Go ahead
    Eligible,
    /// Leave the item alone
    Rejected(String),
}

impl Eligibility {
    /// Shorthand for a rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// True for [`Eligibility::Eligible`].
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}
