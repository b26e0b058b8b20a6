use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notecue_core::config::SchedulerConfig;
use notecue_notify::Dispatcher;
use notecue_reminders::ReminderStore;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, instrument};

use crate::{
    error::{Result, SchedulerError},
    processor::{ProcessReport, Processor},
    worker::{BatchReport, WorkerPool},
};

/// Summary of one poll cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Due reminders returned by the store for this cycle.
    pub due: usize,
    /// The store returned a full batch; more reminders may still be due.
    pub limit_reached: bool,
    pub batch: BatchReport,
}

/// One poll cycle's worth of work: find due reminders, drain them.
struct Poller {
    store: Arc<dyn ReminderStore>,
    pool: WorkerPool,
    batch_limit: usize,
}

impl Poller {
    async fn poll_once(&self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let due = self.store.find_due(started_at, self.batch_limit)?;
        let count = due.len();
        if count == 0 {
            debug!("no due reminders");
        }

        let batch = self.pool.run_batch(due).await;
        let report = CycleReport {
            started_at,
            due: count,
            limit_reached: count >= self.batch_limit,
            batch,
        };
        if count > 0 {
            info!(
                due = count,
                processed = batch.processed,
                delivery_failures = batch.delivery_failures,
                save_failures = batch.save_failures,
                limit_reached = report.limit_reached,
                "poll cycle complete"
            );
        }
        Ok(report)
    }
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polls the reminder store on a fixed interval and drains each cycle's due
/// reminders through a [`WorkerPool`].
///
/// `start` and `stop` are idempotent. `stop` returns only after the cycle in
/// progress (workers included) has finished; no new cycle begins after the
/// stop signal is observed.
pub struct ReminderScheduler {
    poller: Arc<Poller>,
    processor: Arc<Processor>,
    poll_interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        dispatcher: Dispatcher,
        config: &SchedulerConfig,
    ) -> Result<Self> {
        if config.batch_limit == 0 {
            return Err(SchedulerError::InvalidConfig(
                "batch_limit must be at least 1".into(),
            ));
        }
        if config.poll_interval().is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "poll_interval_secs must be at least 1".into(),
            ));
        }

        let processor = Arc::new(Processor::new(store.clone(), dispatcher));
        let pool = WorkerPool::new(processor.clone(), config.worker_count)?;
        Ok(Self {
            poller: Arc::new(Poller {
                store,
                pool,
                batch_limit: config.batch_limit,
            }),
            processor,
            poll_interval: config.poll_interval(),
            running: Mutex::new(None),
        })
    }

    /// Override the poll period. Used by tests that need sub-second cycles.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Spawn the polling loop. The first cycle runs immediately.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                debug!("scheduler already running");
                return;
            }
        }

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(self.poller.clone(), self.poll_interval, rx));
        *running = Some(RunningLoop { shutdown, handle });
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            workers = self.poller.pool.worker_count(),
            batch_limit = self.poller.batch_limit,
            "reminder scheduler started"
        );
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(current) = running.take() else {
            debug!("scheduler not running");
            return;
        };

        // Fails only if the loop already exited; joining below is still correct.
        let _ = current.shutdown.send(true);
        if let Err(e) = current.handle.await {
            error!(error = %e, "scheduler loop ended abnormally");
        }
        info!("reminder scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }

    /// Run a single poll cycle on the caller's task.
    pub async fn poll_once(&self) -> Result<CycleReport> {
        self.poller.poll_once().await
    }

    /// Process one reminder right now, outside the poll cycle.
    #[instrument(skip(self))]
    pub async fn trigger_now(&self, reminder_id: &str) -> Result<ProcessReport> {
        self.processor.trigger_now(reminder_id).await
    }
}

async fn run_loop(poller: Arc<Poller>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    info!("reminder poll loop started");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                // The whole cycle runs inside this arm, so a stop signal is
                // only seen between cycles.
                if let Err(e) = poller.poll_once().await {
                    error!(error = %e, "poll cycle failed");
                }
            }
        }
    }
    info!("reminder poll loop shutting down");
}
