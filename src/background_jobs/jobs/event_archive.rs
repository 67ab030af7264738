//! Event archive background job.
//!
//! Moves events dated before today (UTC) into `events_archive` and removes
//! them from the live table, in one transaction bounded by a timeout.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::calendar_store::ArchiveError;
use chrono::Utc;
use std::time::Duration;
use tracing::info;

pub struct EventArchiveJob {
    interval: Duration,
    timeout: Duration,
}

impl EventArchiveJob {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl BackgroundJob for EventArchiveJob {
    fn id(&self) -> &'static str {
        "event_archive"
    }

    fn name(&self) -> &'static str {
        "Event Archive"
    }

    fn description(&self) -> &'static str {
        "Archive events dated before today and remove them from the calendar"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::AlignedInterval(self.interval)
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // Never interrupt the transaction; the timeout bounds the wait
        ShutdownBehavior::WaitForCompletion
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let cutoff = Utc::now().date_naive();
        let stats = ctx
            .event_store
            .archive_events_before(cutoff, ctx.deadline)
            .map_err(|e| match e {
                ArchiveError::DeadlineExceeded => JobError::Timeout,
                other => JobError::ExecutionFailed(other.to_string()),
            })?;

        if stats.is_empty() {
            info!("No events dated before {} to archive", cutoff);
        } else {
            info!(
                "Archived {} and deleted {} events dated before {}",
                stats.archived, stats.deleted, cutoff
            );
        }

        Ok(())
    }
}
