use super::context::JobContext;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Schedule for when a job should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSchedule {
    /// Run whenever wall-clock time crosses a multiple of the period, counted
    /// from the Unix epoch. A 5 minute period fires at :00, :05, :10...
    AlignedInterval(Duration),
}

impl JobSchedule {
    /// When a freshly registered job should first run.
    pub fn first_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            JobSchedule::AlignedInterval(period) => next_aligned(now, *period),
        }
    }

    /// When the job should run again after a run that ended at `now`.
    ///
    /// Aligned ticks missed while the job was running are skipped.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            JobSchedule::AlignedInterval(period) => next_aligned(now, *period),
        }
    }

    pub fn period(&self) -> Duration {
        match self {
            JobSchedule::AlignedInterval(d) => *d,
        }
    }
}

/// First multiple of `period` strictly after `after`.
fn next_aligned(after: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period_ms = period.as_millis().max(1) as i64;
    let now_ms = after.timestamp_millis();
    let next_ms = (now_ms.div_euclid(period_ms) + 1) * period_ms;
    DateTime::from_timestamp_millis(next_ms).unwrap_or(after)
}

/// How a job should be handled during scheduler shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownBehavior {
    /// Job can be cancelled immediately
    #[default]
    Cancellable,
    /// Wait for job to complete before shutdown
    WaitForCompletion,
}

/// Errors that can occur during job execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,
    #[error("Job is already running")]
    AlreadyRunning,
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Job was cancelled")]
    Cancelled,
    #[error("Job timed out")]
    Timeout,
    #[error("Scheduler is not running")]
    SchedulerUnavailable,
}

/// Trait for background jobs.
///
/// Jobs are executed synchronously in a blocking context.
/// Long-running work should check for cancellation and the deadline.
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// How this job should be handled during shutdown.
    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    /// Upper bound for a single run. The scheduler turns it into
    /// `JobContext::deadline`; enforcing it is up to the job.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Execute the job.
    ///
    /// This method is called from a blocking context using `spawn_blocking`.
    /// The implementation should periodically check `ctx.is_cancelled()` for
    /// long-running operations and return early with `JobError::Cancelled` if true.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
