//! Retry policies deciding whether a failed push gets another attempt.

use crate::types::{ItemId, PushError};
use std::fmt;
use std::sync::Arc;

/// Injected override for the default "keep trying" decision.
///
/// Receives the item and the failure; returning `false` stops the retry
/// cycle for that item regardless of how many attempts remain.
pub type ContinuationPredicate = Arc<dyn Fn(&ItemId, &PushError) -> bool + Send + Sync>;

/// Decides whether a failed push should be attempted again.
///
/// Implementations must be pure: no side effects, no internal state that
/// changes between calls.
///
/// # Examples
///
/// ```rust
/// use pushretry_core::retry::{AttemptLimitPolicy, RetryPolicy};
/// use pushretry_core::types::{ItemId, PushError};
///
/// let policy = AttemptLimitPolicy::new(3);
/// let item = ItemId::new("42");
/// let error = PushError::transient("rate limited");
///
/// assert!(policy.should_retry(&item, 1, &error));
/// assert!(policy.should_retry(&item, 2, &error));
/// assert!(!policy.should_retry(&item, 3, &error));
/// ```
pub trait RetryPolicy: Send + Sync {
    /// Whether another attempt should be scheduled.
    ///
    /// # Parameters
    /// - `item`: The item whose push failed
    /// - `attempt_count`: The attempt that just failed (1-indexed)
    /// - `error`: The failure reported by the executor
    fn should_retry(&self, item: &ItemId, attempt_count: u32, error: &PushError) -> bool;

    /// Upper bound on the attempt count.
    fn max_attempts(&self) -> u32;
}

/// Default policy: retry whenever `attempt_count < max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptLimitPolicy {
    max_attempts: u32,
}

impl AttemptLimitPolicy {
    /// Create a policy bounded by `max_attempts`.
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl Default for AttemptLimitPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy for AttemptLimitPolicy {
    fn should_retry(&self, _item: &ItemId, attempt_count: u32, _error: &PushError) -> bool {
        attempt_count < self.max_attempts
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Attempt limit combined with an injected continuation predicate.
///
/// # Examples
///
/// ```rust
/// use pushretry_core::retry::{PredicatePolicy, RetryPolicy};
/// use pushretry_core::types::{ItemId, PushError};
///
/// // Never retry permanent failures
/// let policy = PredicatePolicy::new(3, |_item, error| !error.is_permanent());
/// let item = ItemId::new("42");
///
/// assert!(policy.should_retry(&item, 1, &PushError::transient("timeout")));
/// assert!(!policy.should_retry(&item, 1, &PushError::permanent("invalid markup")));
/// ```
#[derive(Clone)]
pub struct PredicatePolicy {
    limit: AttemptLimitPolicy,
    predicate: ContinuationPredicate,
}

impl PredicatePolicy {
    /// Create a policy from a limit and a predicate closure.
    pub fn new<F>(max_attempts: u32, predicate: F) -> Self
    where
        F: Fn(&ItemId, &PushError) -> bool + Send + Sync + 'static,
    {
        Self::from_arc(max_attempts, Arc::new(predicate))
    }

    /// Create a policy from an already shared predicate.
    pub fn from_arc(max_attempts: u32, predicate: ContinuationPredicate) -> Self {
        Self {
            limit: AttemptLimitPolicy::new(max_attempts),
            predicate,
        }
    }
}

impl fmt::Debug for PredicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicatePolicy")
            .field("max_attempts", &self.limit.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy for PredicatePolicy {
    fn should_retry(&self, item: &ItemId, attempt_count: u32, error: &PushError) -> bool {
        (self.predicate)(item, error) && self.limit.should_retry(item, attempt_count, error)
    }

    fn max_attempts(&self) -> u32 {
        self.limit.max_attempts
    }
}
