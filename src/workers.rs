//! Startup and shutdown of the background workers.
//!
//! The host starts one [`BackgroundWorkers`] at boot. Request handling takes
//! its [`EventService`], which feeds reminders to the running dispatcher.

use crate::background_jobs::jobs::EventArchiveJob;
use crate::background_jobs::{create_scheduler, JobContext, SchedulerHandle};
use crate::calendar_store::{EventStore, UserStore};
use crate::config::{EventArchiveSettings, ReminderSettings};
use crate::events::EventService;
use crate::notifications::NotificationSender;
use crate::reminders::{create_dispatcher, ReminderHandle};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct BackgroundWorkers {
    events: EventService,
    reminders: ReminderHandle,
    reminder_cancellation: CancellationToken,
    reminder_grace: Duration,
    scheduler: SchedulerHandle,
    dispatcher_task: JoinHandle<()>,
    scheduler_task: JoinHandle<()>,
}

impl BackgroundWorkers {
    /// Spawn the reminder dispatcher and the job scheduler with the event
    /// archive registered.
    ///
    /// Both run under child tokens of `shutdown_token`. Archive runs get their
    /// own root token, so shutdown waits for a run instead of cancelling it.
    pub async fn start<S>(
        store: Arc<S>,
        sender: Arc<dyn NotificationSender>,
        reminders: &ReminderSettings,
        event_archive: &EventArchiveSettings,
        shutdown_token: &CancellationToken,
    ) -> Self
    where
        S: UserStore + EventStore + 'static,
    {
        let user_store: Arc<dyn UserStore> = store.clone();
        let event_store: Arc<dyn EventStore> = store;

        let (dispatcher, reminder_handle) = create_dispatcher(
            user_store,
            event_store.clone(),
            sender,
            reminders.queue_capacity,
        );
        let reminder_cancellation = shutdown_token.child_token();
        let dispatcher_task = tokio::spawn(dispatcher.run(reminder_cancellation.clone()));

        let job_context = JobContext::new(CancellationToken::new(), event_store.clone());
        let (mut scheduler, scheduler_handle) =
            create_scheduler(shutdown_token.child_token(), job_context);
        scheduler
            .register_job(Arc::new(EventArchiveJob::new(
                event_archive.interval,
                event_archive.timeout,
            )))
            .await;
        let scheduler_task = tokio::spawn(async move { scheduler.run().await });

        info!("Background workers running");

        Self {
            events: EventService::new(event_store, reminder_handle.clone()),
            reminders: reminder_handle,
            reminder_cancellation,
            reminder_grace: reminders.shutdown_grace,
            scheduler: scheduler_handle,
            dispatcher_task,
            scheduler_task,
        }
    }

    pub fn events(&self) -> &EventService {
        &self.events
    }

    pub fn reminders(&self) -> &ReminderHandle {
        &self.reminders
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Stop the scheduler, then the dispatcher. Reminders still pending after
    /// the grace period are abandoned.
    pub async fn shutdown(self) -> Result<()> {
        self.scheduler.stop().await;

        let grace = self.reminder_grace;
        if tokio::time::timeout(grace, self.reminders.stop())
            .await
            .is_err()
        {
            info!(
                "{} reminders still pending after {:?}, abandoning them",
                self.reminders.in_flight(),
                grace
            );
            self.reminder_cancellation.cancel();
            self.reminders.stop().await;
        }

        self.dispatcher_task
            .await
            .context("Reminder dispatcher task failed")?;
        self.scheduler_task
            .await
            .context("Job scheduler task failed")?;
        Ok(())
    }
}
