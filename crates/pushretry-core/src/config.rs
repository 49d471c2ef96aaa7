//! Retry configuration
//!
//! Two layers:
//!
//! - [`RetrySettings`] holds the plain tunables. It deserializes from TOML
//!   and can be overlaid with `PUSHRETRY_*` environment variables.
//! - [`RetryConfig`] is the validated, immutable configuration handed to the
//!   orchestrator. On top of the settings it carries the injectable
//!   predicates, which have no serialized form.

use crate::error::ConfigError;
use crate::retry::{AttemptLimitPolicy, ContinuationPredicate, PredicatePolicy, RetryPolicy};
use crate::types::{Eligibility, ItemId, PushError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on attempts per retry cycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between a failure and the next attempt.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(120);

/// Default period of the reconciliation sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Default age of the oldest changes the sweep looks at.
pub const DEFAULT_SWEEP_WINDOW_START: Duration = Duration::from_secs(45 * 60);

/// Default cool-down: changes younger than this are left to the event path.
pub const DEFAULT_SWEEP_WINDOW_END: Duration = Duration::from_secs(5 * 60);

/// Default content type that participates in retries.
pub const DEFAULT_TRACKED_ITEM_TYPE: &str = "post";

/// Default ceiling on simultaneously pending delayed jobs.
pub const DEFAULT_MAX_PENDING_JOBS: usize = 10_000;

/// Longest interval any setting may express.
pub const MAX_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Prefix of the environment variables read by [`RetrySettings::with_env_overrides`].
pub const ENV_PREFIX: &str = "PUSHRETRY_";

/// Eligibility predicate for scheduling and sweep inclusion.
pub type EligibilityCheck = Arc<dyn Fn(&ItemId) -> Eligibility + Send + Sync>;

/// Serializable tunables.
///
/// Durations are expressed in whole seconds so the TOML form stays readable:
///
/// ```toml
/// max_attempts = 5
/// retry_interval_seconds = 60
/// sweep_window_start_seconds = 3600
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempts per retry cycle
    pub max_attempts: u32,

    /// Delay before each delayed attempt
    pub retry_interval_seconds: u64,

    /// Period of the reconciliation sweep
    pub sweep_interval_seconds: u64,

    /// Oldest modification age the sweep selects (exclusive)
    pub sweep_window_start_seconds: u64,

    /// Youngest modification age the sweep selects (exclusive)
    pub sweep_window_end_seconds: u64,

    /// Content type that participates in retries
    pub tracked_item_type: String,

    /// Make the sweep leave exhausted items alone instead of re-driving them
    pub sweep_respects_max_attempts: bool,

    /// Ceiling on pending delayed jobs
    pub max_pending_jobs: usize,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval_seconds: DEFAULT_RETRY_INTERVAL.as_secs(),
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL.as_secs(),
            sweep_window_start_seconds: DEFAULT_SWEEP_WINDOW_START.as_secs(),
            sweep_window_end_seconds: DEFAULT_SWEEP_WINDOW_END.as_secs(),
            tracked_item_type: DEFAULT_TRACKED_ITEM_TYPE.to_string(),
            sweep_respects_max_attempts: false,
            max_pending_jobs: DEFAULT_MAX_PENDING_JOBS,
        }
    }
}

impl RetrySettings {
    /// Parse settings from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Overlay `PUSHRETRY_*` environment variables onto these settings.
    ///
    /// Recognised variables: `PUSHRETRY_MAX_ATTEMPTS`,
    /// `PUSHRETRY_RETRY_INTERVAL_SECONDS`, `PUSHRETRY_SWEEP_INTERVAL_SECONDS`,
    /// `PUSHRETRY_SWEEP_WINDOW_START_SECONDS`, `PUSHRETRY_SWEEP_WINDOW_END_SECONDS`,
    /// `PUSHRETRY_TRACKED_ITEM_TYPE`, `PUSHRETRY_SWEEP_RESPECTS_MAX_ATTEMPTS` and
    /// `PUSHRETRY_MAX_PENDING_JOBS`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_parse("MAX_ATTEMPTS")? {
            self.max_attempts = v;
        }
        if let Some(v) = env_parse("RETRY_INTERVAL_SECONDS")? {
            self.retry_interval_seconds = v;
        }
        if let Some(v) = env_parse("SWEEP_INTERVAL_SECONDS")? {
            self.sweep_interval_seconds = v;
        }
        if let Some(v) = env_parse("SWEEP_WINDOW_START_SECONDS")? {
            self.sweep_window_start_seconds = v;
        }
        if let Some(v) = env_parse("SWEEP_WINDOW_END_SECONDS")? {
            self.sweep_window_end_seconds = v;
        }
        if let Some(v) = env_var("TRACKED_ITEM_TYPE") {
            self.tracked_item_type = v;
        }
        if let Some(v) = env_parse("SWEEP_RESPECTS_MAX_ATTEMPTS")? {
            self.sweep_respects_max_attempts = v;
        }
        if let Some(v) = env_parse("MAX_PENDING_JOBS")? {
            self.max_pending_jobs = v;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(settings = ?self, "Applied environment overrides");

        Ok(self)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn env_parse<T>(suffix: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match env_var(suffix) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Env {
                name: format!("{ENV_PREFIX}{suffix}"),
                reason: e.to_string(),
            }),
    }
}

/// Validated configuration for the retry subsystem.
///
/// Built once at startup and shared immutably (typically behind an `Arc`).
#[derive(Clone)]
pub struct RetryConfig {
    /// Attempts per retry cycle
    pub max_attempts: u32,

    /// Delay before each delayed attempt
    pub retry_interval: Duration,

    /// Period of the reconciliation sweep
    pub sweep_interval: Duration,

    /// Oldest modification age the sweep selects (exclusive)
    pub sweep_window_start: Duration,

    /// Youngest modification age the sweep selects (exclusive)
    pub sweep_window_end: Duration,

    /// Content type that participates in retries
    pub tracked_item_type: String,

    /// Make the sweep leave exhausted items alone
    pub sweep_respects_max_attempts: bool,

    /// Ceiling on pending delayed jobs
    pub max_pending_jobs: usize,

    /// Decides whether an updated item gets a first delayed attempt
    pub schedule_eligibility: EligibilityCheck,

    /// Decides whether the sweep re-drives an item
    pub sweep_eligibility: EligibilityCheck,

    /// Overrides the default retry decision when set
    pub retry_continuation: Option<ContinuationPredicate>,
}

impl RetryConfig {
    /// Create a builder starting from the defaults.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Validate `settings` and wrap them with always-eligible predicates.
    pub fn from_settings(settings: RetrySettings) -> Result<Self, ConfigError> {
        RetryConfigBuilder::from_settings(settings).build()
    }

    /// The retry policy implied by this configuration.
    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        match &self.retry_continuation {
            Some(predicate) => Arc::new(PredicatePolicy::from_arc(
                self.max_attempts,
                Arc::clone(predicate),
            )),
            None => Arc::new(AttemptLimitPolicy::new(self.max_attempts)),
        }
    }

    /// Evaluate the scheduling eligibility predicate.
    pub fn check_schedule_eligibility(&self, item: &ItemId) -> Eligibility {
        (self.schedule_eligibility)(item)
    }

    /// Evaluate the sweep eligibility predicate.
    pub fn check_sweep_eligibility(&self, item: &ItemId) -> Eligibility {
        (self.sweep_eligibility)(item)
    }

    /// Check every tunable is in range.
    ///
    /// Fields are public, so a configuration edited after `build` should be
    /// validated again before use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        check_interval("retry_interval", self.retry_interval)?;
        check_interval("sweep_interval", self.sweep_interval)?;
        check_interval("sweep_window_start", self.sweep_window_start)?;
        if self.sweep_window_end > MAX_INTERVAL {
            return Err(invalid("sweep_window_end", "exceeds 30 days"));
        }
        if self.sweep_window_start <= self.sweep_window_end {
            return Err(invalid(
                "sweep_window_start",
                format!(
                    "must be greater than sweep_window_end ({:?} <= {:?})",
                    self.sweep_window_start, self.sweep_window_end
                ),
            ));
        }
        if self.tracked_item_type.trim().is_empty() {
            return Err(invalid("tracked_item_type", "must not be empty"));
        }
        if self.max_pending_jobs == 0 {
            return Err(invalid("max_pending_jobs", "must be at least 1"));
        }
        Ok(())
    }

    /// `retry_interval` as a calendar offset.
    ///
    /// The conversions saturate instead of overflowing; callers still use
    /// checked date arithmetic with them.
    pub fn retry_delay(&self) -> chrono::Duration {
        to_chrono(self.retry_interval)
    }

    /// `sweep_window_start` as a calendar offset.
    pub fn sweep_window_start_delta(&self) -> chrono::Duration {
        to_chrono(self.sweep_window_start)
    }

    /// `sweep_window_end` as a calendar offset.
    pub fn sweep_window_end_delta(&self) -> chrono::Duration {
        to_chrono(self.sweep_window_end)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let settings = RetrySettings::default();
        Self {
            max_attempts: settings.max_attempts,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweep_window_start: DEFAULT_SWEEP_WINDOW_START,
            sweep_window_end: DEFAULT_SWEEP_WINDOW_END,
            tracked_item_type: settings.tracked_item_type,
            sweep_respects_max_attempts: settings.sweep_respects_max_attempts,
            max_pending_jobs: settings.max_pending_jobs,
            schedule_eligibility: always_eligible(),
            sweep_eligibility: always_eligible(),
            retry_continuation: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("retry_interval", &self.retry_interval)
            .field("sweep_interval", &self.sweep_interval)
            .field("sweep_window_start", &self.sweep_window_start)
            .field("sweep_window_end", &self.sweep_window_end)
            .field("tracked_item_type", &self.tracked_item_type)
            .field("sweep_respects_max_attempts", &self.sweep_respects_max_attempts)
            .field("max_pending_jobs", &self.max_pending_jobs)
            .field("retry_continuation", &self.retry_continuation.is_some())
            .finish_non_exhaustive()
    }
}

fn always_eligible() -> EligibilityCheck {
    Arc::new(|_| Eligibility::Eligible)
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Builder for [`RetryConfig`].
///
/// # Examples
///
/// ```rust
/// use pushretry_core::config::RetryConfig;
/// use pushretry_core::types::Eligibility;
/// use std::time::Duration;
///
/// let config = RetryConfig::builder()
///     .max_attempts(5)
///     .retry_interval(Duration::from_secs(60))
///     .schedule_eligibility(|item| {
///         if item.as_str().starts_with("syndicated-") {
///             Eligibility::rejected("syndicated content is pushed upstream")
///         } else {
///             Eligibility::Eligible
///         }
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(config.retry_interval, Duration::from_secs(60));
/// ```
pub struct RetryConfigBuilder {
    max_attempts: u32,
    retry_interval: Duration,
    sweep_interval: Duration,
    sweep_window_start: Duration,
    sweep_window_end: Duration,
    tracked_item_type: String,
    sweep_respects_max_attempts: bool,
    max_pending_jobs: usize,
    schedule_eligibility: Option<EligibilityCheck>,
    sweep_eligibility: Option<EligibilityCheck>,
    retry_continuation: Option<ContinuationPredicate>,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::from_settings(RetrySettings::default())
    }
}

impl RetryConfigBuilder {
    /// Start from serialized settings.
    pub fn from_settings(settings: RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            retry_interval: Duration::from_secs(settings.retry_interval_seconds),
            sweep_interval: Duration::from_secs(settings.sweep_interval_seconds),
            sweep_window_start: Duration::from_secs(settings.sweep_window_start_seconds),
            sweep_window_end: Duration::from_secs(settings.sweep_window_end_seconds),
            tracked_item_type: settings.tracked_item_type,
            sweep_respects_max_attempts: settings.sweep_respects_max_attempts,
            max_pending_jobs: settings.max_pending_jobs,
            schedule_eligibility: None,
            sweep_eligibility: None,
            retry_continuation: None,
        }
    }

    /// Set the attempt bound.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay before each delayed attempt.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the sweep period.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the sweep window as `(oldest age, youngest age)`.
    pub fn sweep_window(mut self, start: Duration, end: Duration) -> Self {
        self.sweep_window_start = start;
        self.sweep_window_end = end;
        self
    }

    /// Set the tracked content type.
    pub fn tracked_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.tracked_item_type = item_type.into();
        self
    }

    /// Make the sweep leave exhausted items alone.
    pub fn sweep_respects_max_attempts(mut self, enabled: bool) -> Self {
        self.sweep_respects_max_attempts = enabled;
        self
    }

    /// Set the pending job ceiling.
    pub fn max_pending_jobs(mut self, limit: usize) -> Self {
        self.max_pending_jobs = limit;
        self
    }

    /// Install the scheduling eligibility predicate.
    pub fn schedule_eligibility<F>(mut self, check: F) -> Self
    where
        F: Fn(&ItemId) -> Eligibility + Send + Sync + 'static,
    {
        self.schedule_eligibility = Some(Arc::new(check));
        self
    }

    /// Install the sweep eligibility predicate.
    pub fn sweep_eligibility<F>(mut self, check: F) -> Self
    where
        F: Fn(&ItemId) -> Eligibility + Send + Sync + 'static,
    {
        self.sweep_eligibility = Some(Arc::new(check));
        self
    }

    /// Install the retry continuation predicate.
    pub fn retry_continuation<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ItemId, &PushError) -> bool + Send + Sync + 'static,
    {
        self.retry_continuation = Some(Arc::new(predicate));
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        let config = RetryConfig {
            max_attempts: self.max_attempts,
            retry_interval: self.retry_interval,
            sweep_interval: self.sweep_interval,
            sweep_window_start: self.sweep_window_start,
            sweep_window_end: self.sweep_window_end,
            tracked_item_type: self.tracked_item_type,
            sweep_respects_max_attempts: self.sweep_respects_max_attempts,
            max_pending_jobs: self.max_pending_jobs,
            schedule_eligibility: self.schedule_eligibility.unwrap_or_else(always_eligible),
            sweep_eligibility: self.sweep_eligibility.unwrap_or_else(always_eligible),
            retry_continuation: self.retry_continuation,
        };
        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn check_interval(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(invalid(field, "must be greater than zero"));
    }
    if value > MAX_INTERVAL {
        return Err(invalid(field, "exceeds 30 days"));
    }
    Ok(())
}
