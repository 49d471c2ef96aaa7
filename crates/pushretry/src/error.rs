//! Error types for the retry runtime
//!
//! Only failures that leave bookkeeping in doubt reach the caller: a store
//! that cannot be read or written, or a content layer that cannot report an
//! item's status. Push and scheduling failures are reported as events.

use crate::collaborators::SourceError;
use pushretry_core::error::{ConfigError, StoreError};

/// Result type for retry operations
pub type Result<T> = std::result::Result<T, RetryError>;

/// Errors propagated to callers of the orchestrator and service.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Retry state could not be read or persisted
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The content layer failed to answer
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Invalid configuration or incomplete wiring
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A background task could not be joined
    #[error("background task failed: {0}")]
    Task(String),
}
