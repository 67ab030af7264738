use super::job::{BackgroundJob, JobError, JobSchedule};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Information about a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: JobScheduleInfo,
    pub is_running: bool,
    pub last_run: Option<JobRunInfo>,
    pub next_run_at: Option<String>,
}

/// Serializable schedule information.
#[derive(Debug, Clone, Serialize)]
pub struct JobScheduleInfo {
    #[serde(rename = "type")]
    pub schedule_type: String,
    pub value_secs: u64,
}

impl From<JobSchedule> for JobScheduleInfo {
    fn from(schedule: JobSchedule) -> Self {
        let schedule_type = match schedule {
            JobSchedule::AlignedInterval(_) => "aligned_interval",
        };
        JobScheduleInfo {
            schedule_type: schedule_type.to_string(),
            value_secs: schedule.period().as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Running => "running",
            JobRunStatus::Completed => "completed",
            JobRunStatus::Failed => "failed",
            JobRunStatus::Cancelled => "cancelled",
            JobRunStatus::TimedOut => "timed_out",
        }
    }
}

/// A single execution of a job, kept in memory for the latest run only.
#[derive(Debug, Clone)]
pub struct JobRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

/// Serializable job run information.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunInfo {
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

impl From<JobRun> for JobRunInfo {
    fn from(run: JobRun) -> Self {
        JobRunInfo {
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|dt| dt.to_rfc3339()),
            status: run.status.as_str().to_string(),
            error_message: run.error_message,
            triggered_by: run.triggered_by,
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub struct SharedJobState {
    /// Static job info (set at registration, never changes)
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    /// Currently running job IDs
    pub running_jobs: HashSet<String>,
    /// Next scheduled run per job
    pub next_runs: HashMap<String, DateTime<Utc>>,
    /// Most recent run per job
    pub last_runs: HashMap<String, JobRun>,
}

impl SharedJobState {
    fn job_info(&self, job_id: &str, job: &Arc<dyn BackgroundJob>) -> JobInfo {
        JobInfo {
            id: job_id.to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            schedule: job.schedule().into(),
            is_running: self.running_jobs.contains(job_id),
            last_run: self.last_runs.get(job_id).cloned().map(JobRunInfo::from),
            next_run_at: self.next_runs.get(job_id).map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Handle to interact with the job scheduler from the host process.
#[derive(Clone)]
pub struct SchedulerHandle {
    /// Channel to send commands to the scheduler
    command_tx: mpsc::Sender<SchedulerCommand>,
    /// Shared state for reading job info
    shared_state: Arc<RwLock<SharedJobState>>,
    /// Cancelling it makes the scheduler loop shut down
    shutdown_token: CancellationToken,
    /// Cancelled by the scheduler once its shutdown is complete
    stopped: CancellationToken,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        shutdown_token: CancellationToken,
        stopped: CancellationToken,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            shutdown_token,
            stopped,
        }
    }

    /// Get information about all registered jobs.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.shared_state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(job_id, job)| state.job_info(job_id, job))
            .collect();

        // Sort by job ID for consistent ordering
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Get information about a specific job.
    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        let state = self.shared_state.read().await;
        state.jobs.get(job_id).map(|job| state.job_info(job_id, job))
    }

    /// Trigger a job manually. Refused while the job is running.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        if self.shutdown_token.is_cancelled() {
            return Err(JobError::SchedulerUnavailable);
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::SchedulerUnavailable)?;

        response_rx
            .await
            .map_err(|_| JobError::SchedulerUnavailable)?
    }

    /// Check if a job is currently running.
    pub async fn is_job_running(&self, job_id: &str) -> bool {
        let state = self.shared_state.read().await;
        state.running_jobs.contains(job_id)
    }

    /// Check if a job with the given ID exists.
    pub async fn job_exists(&self, job_id: &str) -> bool {
        let state = self.shared_state.read().await;
        state.jobs.contains_key(job_id)
    }

    /// Stop scheduling and wait until the scheduler has shut down.
    ///
    /// Runs of `WaitForCompletion` jobs are awaited, never interrupted. Once
    /// this returns no job is running. Requires `JobScheduler::run` to be
    /// polled.
    pub async fn stop(&self) {
        self.shutdown_token.cancel();
        self.stopped.cancelled().await;
        info!("Job scheduler fully stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }
}
