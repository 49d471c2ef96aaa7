//! Logging helpers
//!
//! [`log_events`] mirrors every [`RetryEvent`] into `tracing`. With the
//! `trace` feature, [`init_tracing`] installs a fmt subscriber filtered by
//! `RUST_LOG`.

use crate::events::{EventBus, RetryEvent, SubscriptionHandle};
use tracing::{info, warn};

/// Subscribe a handler that logs every event.
pub async fn log_events(bus: &EventBus) -> SubscriptionHandle {
    bus.subscribe_all(log_event).await
}

fn log_event(event: &RetryEvent) {
    match event {
        RetryEvent::RetrySuccess {
            item_id,
            external_reference,
            attempt_count,
        } => info!(
            target: "pushretry::events",
            item_id = %item_id,
            attempt_count,
            external_reference = external_reference.as_deref().unwrap_or(""),
            "retry_success"
        ),
        RetryEvent::RetryFailure {
            item_id,
            error,
            attempt_count,
        } => warn!(
            target: "pushretry::events",
            item_id = %item_id,
            attempt_count,
            error = %error,
            "retry_failure"
        ),
        RetryEvent::SchedulingFailure {
            item_id,
            error_message,
        } => warn!(
            target: "pushretry::events",
            item_id = %item_id,
            error = %error_message,
            "scheduling_failure"
        ),
    }
}

/// Install a global fmt subscriber honouring `RUST_LOG`, defaulting to
/// `info` for this crate.
///
/// Returns an error if a global subscriber is already set.
#[cfg(feature = "trace")]
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pushretry=info,pushretry_core=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}
