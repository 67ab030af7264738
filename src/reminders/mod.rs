//! Delayed reminder delivery.
//!
//! Producers queue [`ReminderTask`]s through a [`ReminderHandle`]. The
//! [`ReminderDispatcher`] loop hands each one to its own tokio task, which
//! waits until the reminder is due and then notifies the event owner.

mod dispatcher;
mod executor;
mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{create_dispatcher, ReminderDispatcher, ReminderHandle, SubmitError};
pub use executor::{
    reminder_body, ReminderError, ReminderExecutor, ReminderOutcome, REMINDER_SUBJECT,
};
pub use task::ReminderTask;
