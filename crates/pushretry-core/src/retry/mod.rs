//! Retry policies.
//!
//! A policy answers a single question after a failed push: should the item
//! get another delayed attempt?
//!
//! # Key Types
//!
//! - [`RetryPolicy`] - Core trait for retry decisions
//! - [`AttemptLimitPolicy`] - Default bounded-attempt policy
//! - [`PredicatePolicy`] - Bounded policy with an injected continuation predicate
//!
//! # Examples
//!
//! ```rust
//! use pushretry_core::retry::{PredicatePolicy, RetryPolicy};
//! use pushretry_core::types::{ItemId, PushError};
//!
//! let policy = PredicatePolicy::new(3, |_item, error| !error.is_permanent());
//! assert!(policy.should_retry(&ItemId::new("1"), 1, &PushError::transient("rate limited")));
//! ```

mod policy;

pub use policy::{AttemptLimitPolicy, ContinuationPredicate, PredicatePolicy, RetryPolicy};
