//! Sync queue: worker pool, retry with exponential backoff, and submission.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use crate::context::{SyncContext, SyncJob, SyncOutcome};

#[derive(Clone, Debug)]
pub struct SyncQueueConfig {
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for SyncQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(60),
        }
    }
}

impl SyncQueueConfig {
    /// Backoff for a given zero-based attempt: base, 2x, 4x...
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay * 2u32.saturating_pow(attempt)
    }
}

/// In-process job queue feeding the async sync worker pool.
///
/// Jobs are delivered at least once; the `SyncContext` implementation keeps
/// duplicate delivery idempotent by re-reading session state before
/// publishing.
#[derive(Clone)]
pub struct SyncQueue {
    sender: mpsc::UnboundedSender<(String, SyncJob)>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncQueue {
    /// Create a new queue with a weak reference to the dispatch context and
    /// spawn its worker pool.
    pub fn new(config: SyncQueueConfig, context: Weak<dyn SyncContext>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(Self::worker_pool(config, context, receiver, shutdown_rx));

        Self {
            sender,
            shutdown_tx,
        }
    }

    /// Submit a sync job, returning its task id.
    pub fn submit(&self, job: SyncJob) -> anyhow::Result<String> {
        let task_id = Uuid::new_v4().to_string();
        tracing::info!(
            task_id = %task_id,
            project_id = job.project_id,
            session_id = %job.session_id,
            "Sync job submitted to queue"
        );
        self.sender
            .send((task_id.clone(), job))
            .map_err(|_| anyhow::anyhow!("sync queue is shut down"))?;
        Ok(task_id)
    }

    async fn worker_pool(
        config: SyncQueueConfig,
        context: Weak<dyn SyncContext>,
        mut receiver: mpsc::UnboundedReceiver<(String, SyncJob)>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            max_retries = config.max_retries,
            "Sync worker pool started"
        );
        let semaphore = Arc::new(Semaphore::new(config.max_workers));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Sync worker pool shutting down");
                    break;
                }
                job = receiver.recv() => {
                    let Some((task_id, job)) = job else {
                        tracing::info!("Sync queue closed, stopping worker pool");
                        break;
                    };
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let config = config.clone();
                    let context = context.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        Self::process_with_retry(task_id, job, config, context).await;
                    });
                }
            }
        }

        tracing::info!("Sync worker pool stopped");
    }

    async fn process_with_retry(
        task_id: String,
        job: SyncJob,
        config: SyncQueueConfig,
        context: Weak<dyn SyncContext>,
    ) {
        let mut last_error = String::new();
        // One initial run plus max_retries retries, backing off between.
        for attempt in 0..=config.max_retries {
            let Some(ctx) = context.upgrade() else {
                tracing::error!(task_id = %task_id, "Sync context was dropped, abandoning job");
                return;
            };

            match ctx.run_sync(&job).await {
                Ok(SyncOutcome::Completed) => {
                    tracing::info!(
                        task_id = %task_id,
                        session_id = %job.session_id,
                        attempt = attempt + 1,
                        "Sync job completed"
                    );
                    return;
                }
                Ok(SyncOutcome::AlreadyDone) => {
                    tracing::info!(
                        task_id = %task_id,
                        session_id = %job.session_id,
                        "Session already terminal, duplicate delivery ignored"
                    );
                    return;
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::error!(
                        task_id = %task_id,
                        session_id = %job.session_id,
                        attempt = attempt + 1,
                        max_retries = config.max_retries,
                        error = %e,
                        "Sync job attempt failed"
                    );
                    if attempt < config.max_retries {
                        let delay = config.backoff(attempt);
                        tracing::info!(
                            task_id = %task_id,
                            backoff_seconds = delay.as_secs(),
                            "Scheduling sync retry"
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        tracing::error!(
            task_id = %task_id,
            session_id = %job.session_id,
            "Sync job failed after max retries"
        );
        if let Some(ctx) = context.upgrade() {
            ctx.mark_failed(&job, &format!("sync failed after retries: {}", last_error))
                .await;
        }
    }

    pub async fn shutdown(&self) {
        tracing::info!("Initiating sync queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}
