#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core abstractions for the pushretry ecosystem.
//!
//! This crate holds everything the retry runtime shares with its
//! collaborators and that needs no async machinery:
//!
//! - **Domain types** (`ItemId`, `ItemUpdate`, `PublishStatus`, `PushError`, ...)
//! - **Retry policies** via the `RetryPolicy` trait
//!   - Bounded attempts (`AttemptLimitPolicy`)
//!   - Injected continuation predicates (`PredicatePolicy`)
//! - **Configuration** (`RetrySettings` from TOML/env, validated `RetryConfig`)
//! - **Clock abstraction** so fire times and sweep windows are testable
//! - **Error types** for configuration, storage and scheduling failures
//!
//! # Examples
//!
//! ```rust
//! use pushretry_core::prelude::*;
//! use std::time::Duration;
//!
//! let config = RetryConfig::builder()
//!     .max_attempts(3)
//!     .retry_interval(Duration::from_secs(120))
//!     .retry_continuation(|_item, error| !error.is_permanent())
//!     .build()
//!     .unwrap();
//!
//! let policy = config.retry_policy();
//! assert!(policy.should_retry(&ItemId::new("42"), 1, &PushError::transient("rate limited")));
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use pushretry_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{RetryConfig, RetryConfigBuilder, RetrySettings};
    pub use crate::error::{ConfigError, SchedulingError, StoreError};
    pub use crate::retry::{AttemptLimitPolicy, PredicatePolicy, RetryPolicy};
    pub use crate::types::{
        Eligibility, ItemId, ItemStatus, ItemSummary, ItemUpdate, PublishStatus, PushError,
        PushErrorKind, PushReceipt,
    };
}
