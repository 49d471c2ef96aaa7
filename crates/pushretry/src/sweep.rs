//! Periodic reconciliation
//!
//! Delayed jobs can be lost (process restart without a durable store,
//! scheduler refusal, a crash mid-attempt). The sweep catches those items
//! by re-driving everything modified within a trailing time window.

use crate::error::Result;
use crate::orchestrator::{AttemptOutcome, RetryOrchestrator, RetryStatus};
use chrono::{DateTime, Utc};
use pushretry_core::config::RetryConfig;
use pushretry_core::types::{Eligibility, ItemSummary};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Trailing modification-time window, both bounds exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepWindow {
    /// Items modified at or before this instant are too old
    pub after: DateTime<Utc>,

    /// Items modified at or after this instant are too recent
    pub before: DateTime<Utc>,
}

impl SweepWindow {
    /// Window for a sweep running at `now`.
    pub fn ending_at(now: DateTime<Utc>, config: &RetryConfig) -> Self {
        let back = |delta| now.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            after: back(config.sweep_window_start_delta()),
            before: back(config.sweep_window_end_delta()),
        }
    }

    /// Whether `modified` falls strictly inside the window.
    pub fn contains(&self, modified: DateTime<Utc>) -> bool {
        self.after < modified && modified < self.before
    }
}

/// Tally of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// The window that was swept
    pub window: SweepWindow,
    /// Items inside the window
    pub selected: usize,
    /// Items handed to the orchestrator
    pub attempted: usize,
    /// Attempts that pushed successfully
    pub published: usize,
    /// Items refused by the sweep eligibility check
    pub rejected: usize,
    /// Exhausted items left alone (only with `sweep_respects_max_attempts`)
    pub skipped_exhausted: usize,
    /// Items whose handling returned an error
    pub failed: usize,
}

impl SweepReport {
    fn new(window: SweepWindow) -> Self {
        Self {
            window,
            selected: 0,
            attempted: 0,
            published: 0,
            rejected: 0,
            skipped_exhausted: 0,
            failed: 0,
        }
    }
}

enum Disposition {
    Rejected,
    SkippedExhausted,
    Attempted(AttemptOutcome),
}

/// Re-drives recently modified items through the orchestrator.
pub struct ReconciliationSweep {
    orchestrator: Arc<RetryOrchestrator>,
}

impl ReconciliationSweep {
    /// Create a sweep over the orchestrator's content source.
    pub fn new(orchestrator: Arc<RetryOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Run one sweep.
    ///
    /// Failure of the candidate query aborts the run. Failures on
    /// individual items are logged, counted and do not stop the others.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let config = self.orchestrator.config();
        let window = SweepWindow::ending_at(self.orchestrator.clock().now(), config);

        let candidates = self
            .orchestrator
            .content()
            .query_recently_modified(window.after, window.before)
            .await?;

        let mut report = SweepReport::new(window);
        for summary in candidates.iter().filter(|s| window.contains(s.last_modified_time)) {
            report.selected += 1;
            match self.sweep_item(summary).await {
                Ok(Disposition::Rejected) => report.rejected += 1,
                Ok(Disposition::SkippedExhausted) => report.skipped_exhausted += 1,
                Ok(Disposition::Attempted(outcome)) => {
                    report.attempted += 1;
                    if matches!(outcome, AttemptOutcome::Published { .. }) {
                        report.published += 1;
                    }
                }
                Err(e) => {
                    warn!(item_id = %summary.id, error = %e, "Sweep could not handle item");
                    report.failed += 1;
                }
            }
        }

        info!(
            selected = report.selected,
            attempted = report.attempted,
            published = report.published,
            rejected = report.rejected,
            skipped_exhausted = report.skipped_exhausted,
            failed = report.failed,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    async fn sweep_item(&self, summary: &ItemSummary) -> Result<Disposition> {
        let config = self.orchestrator.config();
        let item = &summary.id;

        if let Eligibility::Rejected(reason) = config.check_sweep_eligibility(item) {
            debug!(item_id = %item, reason = %reason, "Sweep skipped ineligible item");
            return Ok(Disposition::Rejected);
        }

        if config.sweep_respects_max_attempts {
            // Settled items lose their state even when exhausted
            if self.orchestrator.resolve_if_settled(item).await? {
                return Ok(Disposition::Attempted(AttemptOutcome::AlreadyResolved));
            }
            if let RetryStatus::Exhausted { attempt_count } = self.orchestrator.status(item).await? {
                debug!(item_id = %item, attempt_count, "Sweep skipped exhausted item");
                return Ok(Disposition::SkippedExhausted);
            }
        }

        let outcome = self.orchestrator.attempt(item).await?;
        Ok(Disposition::Attempted(outcome))
    }
}
