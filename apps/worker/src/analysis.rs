//! Analysis worker pool
//!
//! Spawns a configurable number of workers that claim queue entries,
//! decode and analyze the file inside `spawn_blocking` under a hard
//! timeout, and write results back. The default is a single worker
//! because SQLite only has one writer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{Row, SqlitePool};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{WorkerError, WorkerResult};
use crate::features;
use crate::queue::{ClaimedEntry, QueueManager};
use crate::store::FeatureStore;

pub struct AnalysisPool {
    pool: SqlitePool,
    queue: Arc<QueueManager>,
    store: Arc<FeatureStore>,
    worker_count: usize,
    analysis_timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl AnalysisPool {
    pub fn new(
        pool: SqlitePool,
        queue: Arc<QueueManager>,
        store: Arc<FeatureStore>,
        worker_count: usize,
        analysis_timeout: Duration,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            queue,
            store,
            worker_count: worker_count.max(1),
            analysis_timeout,
            poll_interval,
            cancel,
        }
    }

    /// Spawn the worker tasks
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        info!(workers = self.worker_count, "Starting analysis workers");

        (0..self.worker_count)
            .map(|id| {
                let worker = AnalysisWorker {
                    id,
                    pool: self.pool.clone(),
                    queue: Arc::clone(&self.queue),
                    store: Arc::clone(&self.store),
                    analysis_timeout: self.analysis_timeout,
                    poll_interval: self.poll_interval,
                    cancel: self.cancel.clone(),
                };
                tokio::spawn(async move { worker.run().await })
            })
            .collect()
    }
}

struct AnalysisWorker {
    id: usize,
    pool: SqlitePool,
    queue: Arc<QueueManager>,
    store: Arc<FeatureStore>,
    analysis_timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl AnalysisWorker {
    async fn run(&self) {
        debug!(worker = self.id, "Analysis worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.queue.claim_next().await {
                Ok(Some(entry)) => {
                    if let Err(e) = self.process(&entry).await {
                        error!(
                            worker = self.id,
                            file = %entry.file_path,
                            error = %e,
                            "Failed to record analysis outcome"
                        );
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(worker = self.id, error = %e, "Failed to claim queue entry");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        debug!(worker = self.id, "Analysis worker stopped");
    }

    /// Analyze one claimed entry and record the outcome
    async fn process(&self, entry: &ClaimedEntry) -> WorkerResult<()> {
        debug!(worker = self.id, file = %entry.file_path, attempt = entry.attempt, "Analyzing file");

        match self.analyze(&entry.file_path).await {
            Ok(()) => {
                self.queue.complete(&entry.file_path).await?;
                info!(worker = self.id, file = %entry.file_path, "Analysis complete");
            }
            Err(e) => {
                e.log();
                self.queue.fail(entry, &e).await?;
            }
        }

        Ok(())
    }

    async fn analyze(&self, file_path: &str) -> WorkerResult<()> {
        let track_id = self.track_id(file_path).await?;
        let path = PathBuf::from(file_path);

        // Decoding is CPU-bound; run it off the async runtime with a cap
        let analysis_task = tokio::task::spawn_blocking(move || features::extract(&path));

        let analysis = match timeout(self.analysis_timeout, analysis_task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(WorkerError::Internal(format!(
                    "analysis task panicked: {}",
                    join_err
                )));
            }
            Err(_) => {
                return Err(WorkerError::Timeout {
                    path: file_path.to_string(),
                    seconds: self.analysis_timeout.as_secs(),
                });
            }
        };

        self.store.upsert(track_id, &analysis).await?;
        Ok(())
    }

    async fn track_id(&self, file_path: &str) -> WorkerResult<i64> {
        let row = sqlx::query("SELECT id FROM tracks WHERE file_path = ?")
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.get("id")).ok_or_else(|| {
            WorkerError::Internal(format!("queued file has no track row: {}", file_path))
        })
    }
}
