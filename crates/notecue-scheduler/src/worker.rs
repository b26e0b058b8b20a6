use std::sync::Arc;

use notecue_reminders::Reminder;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};
use tracing::{debug, error};

use crate::{
    error::{Result, SchedulerError},
    processor::Processor,
};

/// Totals for one drained batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Reminders that went through dispatch, advance and save.
    pub processed: usize,
    /// Processed reminders whose delivery failed on every device.
    pub delivery_failures: usize,
    /// Processed reminders whose advanced state was not persisted.
    pub save_failures: usize,
    /// Reminders skipped because they were in flight elsewhere, no longer
    /// due when reloaded, or could not be reloaded.
    pub skipped: usize,
}

impl BatchReport {
    fn merge(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.delivery_failures += other.delivery_failures;
        self.save_failures += other.save_failures;
        self.skipped += other.skipped;
    }
}

/// Fixed-size pool that drains one poll cycle's batch.
pub struct WorkerPool {
    processor: Arc<Processor>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(processor: Arc<Processor>, worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }
        Ok(Self {
            processor,
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Hand every reminder in `batch` to exactly one worker and return once
    /// all of them are done.
    pub async fn run_batch(&self, batch: Vec<Reminder>) -> BatchReport {
        if batch.is_empty() {
            return BatchReport::default();
        }

        let workers = self.worker_count.min(batch.len());
        let (tx, rx) = mpsc::channel::<Reminder>(self.worker_count);
        let rx = Arc::new(Mutex::new(rx));

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let rx = rx.clone();
            let processor = self.processor.clone();
            set.spawn(async move { work(worker_id, rx, processor).await });
        }

        for reminder in batch {
            if tx.send(reminder).await.is_err() {
                // Every worker is gone; the rest stay due for the next cycle.
                error!("all workers exited early; batch truncated");
                break;
            }
        }
        drop(tx);

        let mut report = BatchReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(partial) => report.merge(partial),
                Err(e) => error!(error = %e, "reminder worker panicked"),
            }
        }
        report
    }
}

async fn work(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Reminder>>>,
    processor: Arc<Processor>,
) -> BatchReport {
    let mut report = BatchReport::default();
    loop {
        let next = rx.lock().await.recv().await;
        let Some(reminder) = next else { break };

        match processor.process_due(reminder).await {
            Some(done) => {
                report.processed += 1;
                if !done.dispatch.is_success() {
                    report.delivery_failures += 1;
                }
                if !done.saved {
                    report.save_failures += 1;
                }
            }
            None => report.skipped += 1,
        }
    }
    debug!(worker_id, processed = report.processed, "worker drained");
    report
}
