use super::models::{ArchiveStats, ArchivedEvent, Event, NewEvent, User};
use super::schema::CALENDAR_VERSIONED_SCHEMAS;
use super::{ArchiveError, EventStore, UserStore};
use crate::sqlite_persistence::{VersionedSchema, BASE_DB_VERSION};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, types::Type, Connection, ErrorCode, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

const EVENT_DATE_FORMAT: &str = "%Y-%m-%d";

/// VM instructions between deadline checks while archiving.
const ARCHIVE_PROGRESS_OPS: i32 = 1000;

const EVENT_COLUMNS: &str =
    "id, user_id, event_date, description, remind_at, reminder_sent, created_at, updated_at";

pub struct SqliteCalendarStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCalendarStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open calendar database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        if is_new_db {
            info!("Creating new calendar database at {:?}", path);
            latest_schema().create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;

            if db_version < 1 {
                anyhow::bail!(
                    "Calendar database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let version_index = CALENDAR_VERSIONED_SCHEMAS
                .iter()
                .position(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown calendar database version {}", db_version))?;
            CALENDAR_VERSIONED_SCHEMAS[version_index]
                .validate(&conn)
                .with_context(|| {
                    format!(
                        "Calendar database schema validation failed for version {}",
                        db_version
                    )
                })?;

            let current_version = latest_schema().version;
            if (db_version as usize) < current_version {
                info!(
                    "Migrating calendar database from version {} to {}",
                    db_version, current_version
                );
                Self::migrate_if_needed(&mut conn, db_version as usize)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a fresh in-memory database with the latest schema.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        latest_schema().create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest_from = from_version;
        for schema in CALENDAR_VERSIONED_SCHEMAS.iter() {
            if schema.version > from_version {
                info!(
                    "Running calendar database migration from version {} to {}",
                    latest_from, schema.version
                );
                if let Some(migration_fn) = schema.migration {
                    migration_fn(&tx).with_context(|| {
                        format!("Failed to run migration to version {}", schema.version)
                    })?;
                }
                latest_from = schema.version;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Calendar database mutex poisoned"))
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn format_date(date: &NaiveDate) -> String {
        date.format(EVENT_DATE_FORMAT).to_string()
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: parse_uuid(row, "id")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            created_at: parse_datetime(row, "created_at")?,
            updated_at: parse_datetime(row, "updated_at")?,
        })
    }

    fn move_events_to_archive(
        tx: &Transaction,
        cutoff: &str,
        archived_at: &str,
    ) -> rusqlite::Result<ArchiveStats> {
        let archived = tx.execute(
            "INSERT OR IGNORE INTO events_archive
                (id, user_id, event_date, description, archived_at, original_created_at, original_updated_at)
             SELECT id, user_id, event_date, description, ?1, created_at, updated_at
             FROM events
             WHERE event_date < ?2",
            params![archived_at, cutoff],
        )?;
        let deleted = tx.execute("DELETE FROM events WHERE event_date < ?1", params![cutoff])?;
        Ok(ArchiveStats { archived, deleted })
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        let remind_at = match row.get::<_, Option<String>>("remind_at")? {
            Some(_) => Some(parse_datetime(row, "remind_at")?),
            None => None,
        };

        Ok(Event {
            id: parse_uuid(row, "id")?,
            user_id: parse_uuid(row, "user_id")?,
            event_date: parse_date(row, "event_date")?,
            description: row.get("description")?,
            remind_at,
            reminder_sent: row.get::<_, i64>("reminder_sent")? != 0,
            created_at: parse_datetime(row, "created_at")?,
            updated_at: parse_datetime(row, "updated_at")?,
        })
    }

    fn row_to_archived_event(row: &rusqlite::Row) -> rusqlite::Result<ArchivedEvent> {
        Ok(ArchivedEvent {
            id: parse_uuid(row, "id")?,
            user_id: parse_uuid(row, "user_id")?,
            event_date: parse_date(row, "event_date")?,
            description: row.get("description")?,
            archived_at: parse_datetime(row, "archived_at")?,
            original_created_at: parse_datetime(row, "original_created_at")?,
            original_updated_at: parse_datetime(row, "original_updated_at")?,
        })
    }

    /// Number of events currently in the live table.
    pub fn count_events(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All archived events, oldest event date first.
    pub fn get_archived_events(&self) -> Result<Vec<ArchivedEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, event_date, description, archived_at, original_created_at, original_updated_at
             FROM events_archive ORDER BY event_date ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_archived_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn latest_schema() -> &'static VersionedSchema {
    &CALENDAR_VERSIONED_SCHEMAS[CALENDAR_VERSIONED_SCHEMAS.len() - 1]
}

fn conversion_error<E>(row: &rusqlite::Row, column: &str, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let index = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_uuid(row: &rusqlite::Row, column: &str) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(row, column, e))
}

fn parse_date(row: &rusqlite::Row, column: &str) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(column)?;
    NaiveDate::parse_from_str(&raw, EVENT_DATE_FORMAT).map_err(|e| conversion_error(row, column, e))
}

fn parse_datetime(row: &rusqlite::Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(row, column, e))
}

impl UserStore for SqliteCalendarStore {
    fn create_user(&self, email: &str, password_hash: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Self::format_datetime(&Utc::now());
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id.to_string(), email, password_hash, now],
        )
        .with_context(|| format!("Failed to create user {}", email))?;
        Ok(id)
    }

    fn get_user(&self, user_id: &Uuid) -> Result<Option<User>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE id = ?1",
                params![user_id.to_string()],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE email = ?1",
                params![email],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }
}

impl EventStore for SqliteCalendarStore {
    fn create_event(&self, event: &NewEvent) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Self::format_datetime(&Utc::now());
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events (id, user_id, event_date, description, remind_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id.to_string(),
                event.user_id.to_string(),
                Self::format_date(&event.event_date),
                event.description,
                event.remind_at.as_ref().map(Self::format_datetime),
                now,
            ],
        )
        .context("Failed to create event")?;
        Ok(id)
    }

    fn get_event(&self, event_id: &Uuid) -> Result<Option<Event>> {
        let conn = self.lock()?;
        let event = conn
            .query_row(
                &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                params![event_id.to_string()],
                Self::row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    fn get_events_for_user(&self, user_id: &Uuid) -> Result<Vec<Event>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM events WHERE user_id = ?1 ORDER BY event_date ASC",
            EVENT_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![user_id.to_string()], Self::row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn delete_event(&self, event_id: &Uuid, user_id: &Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM events WHERE id = ?1 AND user_id = ?2",
            params![event_id.to_string(), user_id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn mark_reminder_sent(&self, event_id: &Uuid) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE events SET reminder_sent = 1, updated_at = ?2 WHERE id = ?1",
            params![event_id.to_string(), Self::format_datetime(&Utc::now())],
        )
        .context("Failed to mark reminder sent")?;
        Ok(())
    }

    fn archive_events_before(
        &self,
        cutoff: NaiveDate,
        deadline: Option<Instant>,
    ) -> Result<ArchiveStats, ArchiveError> {
        let mut conn = self.lock()?;
        let cutoff = Self::format_date(&cutoff);
        let archived_at = Self::format_datetime(&Utc::now());

        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction()?;

        // Interrupts the running statement once the deadline passes.
        if let Some(deadline) = deadline {
            tx.progress_handler(
                ARCHIVE_PROGRESS_OPS,
                Some(move || Instant::now() >= deadline),
            );
        }
        let moved = Self::move_events_to_archive(&tx, &cutoff, &archived_at);
        tx.progress_handler(0, None::<fn() -> bool>);

        let stats = moved.map_err(|e| {
            if e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
                debug!("Archive interrupted at deadline, rolling back");
                ArchiveError::DeadlineExceeded
            } else {
                ArchiveError::Database(e)
            }
        })?;

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                debug!(
                    "Archive deadline exceeded before commit, rolling back {} rows",
                    stats.deleted
                );
                return Err(ArchiveError::DeadlineExceeded);
            }
        }

        tx.commit()?;
        Ok(stats)
    }
}
