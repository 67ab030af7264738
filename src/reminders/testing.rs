//! In-memory collaborators for reminder tests.

use crate::calendar_store::{
    ArchiveError, ArchiveStats, Event, EventStore, NewEvent, User, UserStore,
};
use crate::notifications::{NotificationSender, SendError};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Default)]
struct CalendarState {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    marked: HashSet<Uuid>,
    failing_users: HashSet<Uuid>,
    failing_marks: HashSet<Uuid>,
}

/// User and event store backed by hash maps, with injectable failures.
#[derive(Default)]
pub struct FakeCalendar {
    state: Mutex<CalendarState>,
    lookup_stall: Mutex<Option<Duration>>,
}

impl FakeCalendar {
    /// Add a user owning one event, returning `(user_id, event_id)`.
    pub fn add_event(&self, email: &str, description: &str) -> (Uuid, Uuid) {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        let event = Event {
            id: Uuid::new_v4(),
            user_id: user.id,
            event_date: now.date_naive(),
            description: description.to_string(),
            remind_at: None,
            reminder_sent: false,
            created_at: now,
            updated_at: now,
        };
        let ids = (user.id, event.id);

        let mut state = self.state.lock().unwrap();
        state.users.insert(user.id, user);
        state.events.insert(event.id, event);
        ids
    }

    pub fn remove_event(&self, event_id: &Uuid) {
        self.state.lock().unwrap().events.remove(event_id);
    }

    pub fn fail_user_lookup(&self, user_id: Uuid) {
        self.state.lock().unwrap().failing_users.insert(user_id);
    }

    pub fn fail_mark(&self, event_id: Uuid) {
        self.state.lock().unwrap().failing_marks.insert(event_id);
    }

    /// Make every user lookup block the calling thread for `stall`.
    pub fn set_lookup_stall(&self, stall: Duration) {
        *self.lookup_stall.lock().unwrap() = Some(stall);
    }

    pub fn is_marked(&self, event_id: &Uuid) -> bool {
        self.state.lock().unwrap().marked.contains(event_id)
    }
}

impl UserStore for FakeCalendar {
    fn create_user(&self, _email: &str, _password_hash: &str) -> Result<Uuid> {
        Err(anyhow!("not supported by FakeCalendar"))
    }

    fn get_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        let stall = *self.lookup_stall.lock().unwrap();
        if let Some(stall) = stall {
            std::thread::sleep(stall);
        }
        let state = self.state.lock().unwrap();
        if state.failing_users.contains(user_id) {
            return Err(anyhow!("user store unavailable"));
        }
        Ok(state.users.get(user_id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }
}

impl EventStore for FakeCalendar {
    fn create_event(&self, _event: &NewEvent) -> Result<Uuid> {
        Err(anyhow!("not supported by FakeCalendar"))
    }

    fn get_event(&self, event_id: &Uuid) -> Result<Option<Event>> {
        Ok(self.state.lock().unwrap().events.get(event_id).cloned())
    }

    fn get_events_for_user(&self, user_id: &Uuid) -> Result<Vec<Event>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .events
            .values()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect())
    }

    fn delete_event(&self, event_id: &Uuid, _user_id: &Uuid) -> Result<bool> {
        Ok(self.state.lock().unwrap().events.remove(event_id).is_some())
    }

    fn mark_reminder_sent(&self, event_id: &Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_marks.contains(event_id) {
            return Err(anyhow!("event store unavailable"));
        }
        state.marked.insert(*event_id);
        Ok(())
    }

    fn archive_events_before(
        &self,
        _cutoff: NaiveDate,
        _deadline: Option<Instant>,
    ) -> Result<ArchiveStats, ArchiveError> {
        Ok(ArchiveStats::default())
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub subject: String,
    pub body: String,
    pub to: String,
    pub at: Instant,
}

/// Sender that records every message, optionally failing for some recipients
/// or delaying each send.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    failing_recipients: Mutex<HashSet<String>>,
    send_delay: Mutex<Option<Duration>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_for(&self, to: &str) {
        self.failing_recipients
            .lock()
            .unwrap()
            .insert(to.to_string());
    }

    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, subject: &str, body: &str, to: &str) -> Result<(), SendError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_recipients.lock().unwrap().contains(to) {
            return Err(SendError::Transport("relay refused".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            subject: subject.to_string(),
            body: body.to_string(),
            to: to.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}
