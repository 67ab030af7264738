mod file_config;

pub use file_config::{EventArchiveConfig, FileConfig, RemindersConfig, SmtpConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REMINDER_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_REMINDER_SHUTDOWN_GRACE_SECS: u64 = 5;
pub const DEFAULT_ARCHIVE_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_ARCHIVE_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub reminder_queue_capacity: usize,
    pub reminder_shutdown_grace_secs: u64,
    pub archive_interval_secs: u64,
    pub archive_timeout_secs: u64,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            reminder_queue_capacity: DEFAULT_REMINDER_QUEUE_CAPACITY,
            reminder_shutdown_grace_secs: DEFAULT_REMINDER_SHUTDOWN_GRACE_SECS,
            archive_interval_secs: DEFAULT_ARCHIVE_INTERVAL_SECS,
            archive_timeout_secs: DEFAULT_ARCHIVE_TIMEOUT_SECS,
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub reminders: ReminderSettings,
    pub event_archive: EventArchiveSettings,
    /// `None` means reminders are only logged, never delivered.
    pub smtp: Option<SmtpSettings>,
}

#[derive(Debug, Clone)]
pub struct ReminderSettings {
    /// Capacity of the bounded intake queue. Producers block when it is full.
    pub queue_capacity: usize,
    /// How long shutdown waits for in-flight reminders before abandoning
    /// the ones that are still waiting for their due time.
    pub shutdown_grace: Duration,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_REMINDER_QUEUE_CAPACITY,
            shutdown_grace: Duration::from_secs(DEFAULT_REMINDER_SHUTDOWN_GRACE_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventArchiveSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for EventArchiveSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_ARCHIVE_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_ARCHIVE_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let reminders_file = file.reminders.unwrap_or_default();
        let queue_capacity = reminders_file
            .queue_capacity
            .unwrap_or(cli.reminder_queue_capacity);
        if queue_capacity == 0 {
            bail!("reminders.queue_capacity must be greater than zero");
        }
        let shutdown_grace_secs = reminders_file
            .shutdown_grace_secs
            .unwrap_or(cli.reminder_shutdown_grace_secs);

        let archive_file = file.event_archive.unwrap_or_default();
        let interval_secs = archive_file
            .interval_secs
            .unwrap_or(cli.archive_interval_secs);
        let timeout_secs = archive_file
            .timeout_secs
            .unwrap_or(cli.archive_timeout_secs);
        if interval_secs == 0 {
            bail!("event_archive.interval_secs must be greater than zero");
        }
        if timeout_secs == 0 {
            bail!("event_archive.timeout_secs must be greater than zero");
        }

        // TOML [smtp] section takes precedence over CLI args as a whole
        let smtp = if let Some(smtp_file) = file.smtp {
            Some(SmtpSettings {
                host: smtp_file.host,
                port: smtp_file.port.unwrap_or(DEFAULT_SMTP_PORT),
                username: smtp_file.username,
                password: smtp_file.password,
                from: smtp_file.from,
            })
        } else if let Some(host) = &cli.smtp_host {
            let (Some(username), Some(password), Some(from)) =
                (&cli.smtp_username, &cli.smtp_password, &cli.smtp_from)
            else {
                bail!("--smtp-host requires --smtp-username, --smtp-password and --smtp-from");
            };
            Some(SmtpSettings {
                host: host.clone(),
                port: cli.smtp_port,
                username: username.clone(),
                password: password.clone(),
                from: from.clone(),
            })
        } else {
            None
        };

        Ok(Self {
            db_path,
            reminders: ReminderSettings {
                queue_capacity,
                shutdown_grace: Duration::from_secs(shutdown_grace_secs),
            },
            event_archive: EventArchiveSettings {
                interval: Duration::from_secs(interval_secs),
                timeout: Duration::from_secs(timeout_secs),
            },
            smtp,
        })
    }
}
