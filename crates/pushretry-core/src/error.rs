//! Error types shared across the pushretry crates.
//!
//! Push failures are not errors at this level: they are expected, carried
//! as [`PushError`](crate::types::PushError) values and reported as events.
//! The enums here cover infrastructure problems.

use crate::types::ItemId;

/// Invalid configuration. Raised at startup, never at retry time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric setting is outside its allowed range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Setting name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A required component was not supplied to a builder
    #[error("missing required component: {0}")]
    Missing(&'static str),

    /// A TOML document could not be parsed
    #[error("failed to parse settings: {0}")]
    Parse(String),

    /// An environment variable held an unusable value
    #[error("invalid environment variable {name}: {reason}")]
    Env {
        /// Variable name
        name: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Failure reading or writing retry state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backing file could not be read or written
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded
    #[error("store serialization error: {0}")]
    Serialization(String),

    /// Backend-specific failure
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The delay mechanism refused a new job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    /// A job for this item is already pending
    #[error("a retry is already scheduled for item {0}")]
    AlreadyScheduled(ItemId),

    /// Too many jobs are pending
    #[error("scheduler is at capacity ({limit} pending jobs)")]
    CapacityExceeded {
        /// Configured limit
        limit: usize,
    },

    /// The scheduler has been shut down or its consumer is gone
    #[error("scheduler is closed")]
    Closed,
}
