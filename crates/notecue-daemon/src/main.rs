use std::sync::Arc;

use clap::{Parser, Subcommand};
use notecue_core::config::{NotecueConfig, PushTransport};
use notecue_devices::DeviceRegistry;
use notecue_notify::{Dispatcher, NotificationSender, SqliteNotificationLogStore};
use notecue_reminders::SqliteReminderStore;
use notecue_scheduler::ReminderScheduler;
use tracing::info;

mod push;

/// Reminder scheduling and push delivery daemon.
#[derive(Parser)]
#[command(name = "notecued", version, about)]
struct Cli {
    /// Config file. Falls back to NOTECUE_CONFIG, then ~/.notecue/notecue.toml.
    #[arg(long, short)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl-C (default).
    Run,
    /// Process one reminder immediately, whether or not it is due.
    Trigger { reminder_id: String },
    /// Run exactly one poll cycle and exit.
    Poll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "notecue_daemon=info,notecue_scheduler=info,notecue_notify=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    let config = NotecueConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        NotecueConfig::default()
    });

    let scheduler = build_scheduler(&config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            scheduler.start().await;
            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
            scheduler.stop().await;
        }
        Command::Trigger { reminder_id } => {
            let report = scheduler.trigger_now(&reminder_id).await?;
            println!(
                "reminder {}: {} sent, {} failed, schedule {:?}, saved: {}",
                report.reminder_id,
                report.dispatch.sent_count(),
                report.dispatch.failed_count(),
                report.advance,
                report.saved
            );
            println!("{}", serde_json::to_string_pretty(&report.dispatch)?);
        }
        Command::Poll => {
            let report = scheduler.poll_once().await?;
            println!(
                "{} due, {} processed, {} delivery failures, {} save failures{}",
                report.due,
                report.batch.processed,
                report.batch.delivery_failures,
                report.batch.save_failures,
                if report.limit_reached {
                    " (batch limit reached)"
                } else {
                    ""
                }
            );
        }
    }
    Ok(())
}

/// Open the database and wire stores, transport and dispatcher into a scheduler.
fn build_scheduler(config: &NotecueConfig) -> anyhow::Result<ReminderScheduler> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    // each subsystem gets its own connection; schemas are created on open
    let reminders = Arc::new(SqliteReminderStore::new(open(db_path)?)?);
    let devices = Arc::new(DeviceRegistry::new(open(db_path)?)?);
    let logs = Arc::new(SqliteNotificationLogStore::new(open(db_path)?)?);
    info!("database migrations complete");

    let sender = build_sender(config)?;
    info!(transport = sender.name(), "push transport ready");

    let dispatcher = Dispatcher::new(devices, logs, sender);
    Ok(ReminderScheduler::new(reminders, dispatcher, &config.scheduler)?)
}

fn open(path: &str) -> rusqlite::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

fn build_sender(config: &NotecueConfig) -> anyhow::Result<Arc<dyn NotificationSender>> {
    let sender: Arc<dyn NotificationSender> = match config.push.transport {
        PushTransport::Log => Arc::new(push::LogSender),
        PushTransport::Webhook => Arc::new(push::WebhookSender::from_config(&config.push)?),
    };
    Ok(sender)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
