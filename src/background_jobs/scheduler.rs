use super::context::JobContext;
use super::handle::{JobRun, JobRunStatus, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError, ShutdownBehavior};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest the scheduler sleeps without re-checking its jobs.
const MAX_IDLE_SLEEP: Duration = Duration::from_secs(60);

/// How long shutdown waits for a cancelled job to notice its cancellation.
const CANCELLABLE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Currently running jobs with their task handles (not shared, managed by scheduler loop)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Job tasks report their id here once their run is recorded.
    finished_tx: mpsc::UnboundedSender<String>,
    finished_rx: mpsc::UnboundedReceiver<String>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Cancelled once shutdown is complete.
    stopped: CancellationToken,

    /// Shared context provided to jobs during execution. Its token is the
    /// parent of every per-run token.
    job_context: JobContext,
}

impl JobScheduler {
    fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        stopped: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            command_receiver,
            finished_tx,
            finished_rx,
            shutdown_token,
            stopped,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        let first_run = job.schedule().first_run(Utc::now());
        info!(
            "Registering job: {} - {} (first run at {})",
            job_id,
            job.description(),
            first_run.to_rfc3339()
        );
        let mut state = self.shared_state.write().await;
        state.next_runs.insert(job_id.clone(), first_run);
        state.jobs.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop. Returns once `SchedulerHandle::stop` was called or
    /// the shutdown token was cancelled, and every run that shutdown waits
    /// for has finished.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                // Shutdown wins over anything else that is ready
                biased;

                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
                Some(job_id) = self.finished_rx.recv() => {
                    self.on_job_finished(&job_id).await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
            }
        }

        self.command_receiver.close();
        while let Ok(SchedulerCommand::TriggerJob { response, .. }) =
            self.command_receiver.try_recv()
        {
            let _ = response.send(Err(JobError::SchedulerUnavailable));
        }

        self.stopped.cancel();
        info!("Job scheduler stopped");
    }

    /// Handle a command from the SchedulerHandle.
    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }

        if state.running_jobs.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    /// Calculate time until the next scheduled job should run.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let mut min_duration = MAX_IDLE_SLEEP;
        let now = Utc::now();

        let state = self.shared_state.read().await;
        for (job_id, next_run) in &state.next_runs {
            if state.running_jobs.contains(job_id) {
                continue; // Rescheduled once it finishes
            }

            if *next_run <= now {
                return Duration::ZERO;
            }
            let duration = (*next_run - now).to_std().unwrap_or(Duration::ZERO);
            if duration < min_duration {
                min_duration = duration;
            }
        }

        min_duration
    }

    /// Run all jobs that are due for scheduled execution.
    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let jobs_to_run: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .next_runs
                .iter()
                .filter(|(job_id, next_run)| {
                    **next_run <= now && !state.running_jobs.contains(*job_id)
                })
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in jobs_to_run {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = {
            let state = self.shared_state.read().await;
            match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            }
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);

        // Mark job as running in shared state
        {
            let mut state = self.shared_state.write().await;
            state.running_jobs.insert(job_id.to_string());
            state.last_runs.insert(
                job_id.to_string(),
                JobRun {
                    started_at: Utc::now(),
                    finished_at: None,
                    status: JobRunStatus::Running,
                    error_message: None,
                    triggered_by: triggered_by.to_string(),
                },
            );
        }

        // Create cancellation token for this job
        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());

        let mut ctx = JobContext::new(cancel_token, Arc::clone(&self.job_context.event_store));
        let timeout = job.timeout();
        ctx.deadline = timeout.map(|t| Instant::now() + t);

        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);
        let finished_tx = self.finished_tx.clone();

        // Spawn the job in a blocking task since jobs are synchronous
        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            let (status, error_msg) = match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                    (JobRunStatus::Completed, None)
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (JobRunStatus::Cancelled, Some("Cancelled".to_string()))
                }
                Ok(Err(JobError::Timeout)) => {
                    warn!(
                        "Job {} timed out after {:?} (limit {:?}), no changes applied",
                        job_id_owned, elapsed, timeout
                    );
                    (JobRunStatus::TimedOut, Some(JobError::Timeout.to_string()))
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()))
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(format!("Task panic: {}", e)))
                }
            };

            {
                let mut state = shared_state.write().await;
                if let Some(run) = state.last_runs.get_mut(&job_id_owned) {
                    run.finished_at = Some(Utc::now());
                    run.status = status;
                    run.error_message = error_msg;
                }
            }

            let _ = finished_tx.send(job_id_owned);
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Release a finished job and schedule its next run.
    async fn on_job_finished(&mut self, job_id: &str) {
        if let Some(handle) = self.running_handles.remove(job_id) {
            let _ = handle.await;
        }
        self.job_cancel_tokens.remove(job_id);

        let mut state = self.shared_state.write().await;
        state.running_jobs.remove(job_id);
        let next_run = state
            .jobs
            .get(job_id)
            .map(|job| job.schedule().next_run_after(Utc::now()));
        if let Some(next_run) = next_run {
            debug!("Job {} next run at {}", job_id, next_run.to_rfc3339());
            state.next_runs.insert(job_id.to_string(), next_run);
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        let mut wait_jobs = Vec::new();
        {
            let state = self.shared_state.read().await;
            for (job_id, handle) in self.running_handles.drain() {
                let behavior = state
                    .jobs
                    .get(&job_id)
                    .map(|j| j.shutdown_behavior())
                    .unwrap_or_default();

                if behavior == ShutdownBehavior::Cancellable {
                    if let Some(token) = self.job_cancel_tokens.get(&job_id) {
                        debug!("Cancelling job: {}", job_id);
                        token.cancel();
                    }
                }
                wait_jobs.push((job_id, handle, behavior));
            }
        }

        let waits = wait_jobs.into_iter().map(|(job_id, handle, behavior)| async move {
            let finished = match behavior {
                ShutdownBehavior::WaitForCompletion => {
                    info!("Waiting for job {} to complete...", job_id);
                    handle.await.is_ok()
                }
                ShutdownBehavior::Cancellable => {
                    match tokio::time::timeout(CANCELLABLE_SHUTDOWN_TIMEOUT, handle).await {
                        Ok(joined) => joined.is_ok(),
                        Err(_) => {
                            warn!(
                                "Job {} did not stop within {:?}",
                                job_id, CANCELLABLE_SHUTDOWN_TIMEOUT
                            );
                            false
                        }
                    }
                }
            };
            (job_id, finished)
        });
        let results = futures::future::join_all(waits).await;

        {
            let mut state = self.shared_state.write().await;
            for (job_id, finished) in results {
                if finished {
                    state.running_jobs.remove(&job_id);
                }
            }
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Create a scheduler and its handle.
///
/// Cancelling `shutdown_token` has the same effect as `SchedulerHandle::stop`.
/// Cancelling the token inside `job_context` cancels every running job,
/// including those that shutdown would otherwise wait for.
pub fn create_scheduler(
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));
    let stopped = CancellationToken::new();

    let scheduler = JobScheduler::new(
        command_rx,
        shutdown_token.clone(),
        stopped.clone(),
        job_context,
        Arc::clone(&shared_state),
    );

    let handle = SchedulerHandle::new(command_tx, shared_state, shutdown_token, stopped);

    (scheduler, handle)
}
