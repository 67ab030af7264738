use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use event_calendar_server::calendar_store::SqliteCalendarStore;
use event_calendar_server::config;
use event_calendar_server::notifications::{LogSender, NotificationSender, SmtpSender};
use event_calendar_server::BackgroundWorkers;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite calendar database file. Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Maximum number of reminders waiting to be dispatched.
    #[clap(long, default_value_t = config::DEFAULT_REMINDER_QUEUE_CAPACITY)]
    pub reminder_queue_capacity: usize,

    /// Seconds to wait on shutdown for pending reminders before abandoning them.
    #[clap(long, default_value_t = config::DEFAULT_REMINDER_SHUTDOWN_GRACE_SECS)]
    pub reminder_shutdown_grace_secs: u64,

    /// Seconds between event archive runs, aligned to the wall clock.
    #[clap(long, default_value_t = config::DEFAULT_ARCHIVE_INTERVAL_SECS)]
    pub archive_interval_secs: u64,

    /// Maximum duration of one event archive run, in seconds.
    #[clap(long, default_value_t = config::DEFAULT_ARCHIVE_TIMEOUT_SECS)]
    pub archive_timeout_secs: u64,

    /// SMTP relay host. Without it reminders are only logged.
    #[clap(long)]
    pub smtp_host: Option<String>,

    #[clap(long, default_value_t = config::DEFAULT_SMTP_PORT)]
    pub smtp_port: u16,

    #[clap(long)]
    pub smtp_username: Option<String>,

    #[clap(long)]
    pub smtp_password: Option<String>,

    /// Sender address of reminder emails.
    #[clap(long)]
    pub smtp_from: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_path: args.db_path.clone(),
            reminder_queue_capacity: args.reminder_queue_capacity,
            reminder_shutdown_grace_secs: args.reminder_shutdown_grace_secs,
            archive_interval_secs: args.archive_interval_secs,
            archive_timeout_secs: args.archive_timeout_secs,
            smtp_host: args.smtp_host.clone(),
            smtp_port: args.smtp_port,
            smtp_username: args.smtp_username.clone(),
            smtp_password: args.smtp_password.clone(),
            smtp_from: args.smtp_from.clone(),
        }
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_path: {:?}", app_config.db_path);
    info!(
        "  reminders: queue capacity {}, shutdown grace {:?}",
        app_config.reminders.queue_capacity, app_config.reminders.shutdown_grace
    );
    info!(
        "  event archive: every {:?}, timeout {:?}",
        app_config.event_archive.interval, app_config.event_archive.timeout
    );

    if !app_config.db_path.exists() {
        info!("Creating new calendar database at {:?}", app_config.db_path);
    }
    let store = Arc::new(SqliteCalendarStore::new(&app_config.db_path)?);

    let sender: Arc<dyn NotificationSender> = match &app_config.smtp {
        Some(smtp) => {
            info!("Delivering reminders through SMTP relay {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpSender::new(smtp)?)
        }
        None => {
            warn!("No SMTP relay configured, reminders will only be logged");
            Arc::new(LogSender)
        }
    };

    let shutdown_token = CancellationToken::new();
    let workers = BackgroundWorkers::start(
        store,
        sender,
        &app_config.reminders,
        &app_config.event_archive,
        &shutdown_token,
    )
    .await;

    wait_for_shutdown_signal().await?;

    workers.shutdown().await?;
    shutdown_token.cancel();
    info!("Shutdown complete");
    Ok(())
}
