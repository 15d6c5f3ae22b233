//! Analysis queue state machine
//!
//! Each entry moves pending -> processing -> {completed | error | skipped}.
//! Claiming is a single UPDATE with a guarded subquery so two workers can
//! never take the same entry. Entries stuck in processing past the stall
//! threshold can be swept back to pending.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::error::{WorkerError, WorkerResult};

/// Queue entry states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Error,
    Skipped,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

/// A claimed queue entry
#[derive(Debug, Clone)]
pub struct ClaimedEntry {
    pub file_path: String,
    /// Attempt number including this claim
    pub attempt: u32,
}

/// Per-status entry counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub error: u64,
    pub skipped: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.error + self.skipped
    }
}

/// Progress summary over the whole queue
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueueProgress {
    pub total: u64,
    pub analyzed: u64,
    pub pending: u64,
    pub failed: u64,
    pub percent: f64,
}

/// A file needing operator attention: failed permanently or stalled
#[derive(Debug, Clone)]
pub struct ProblematicFile {
    pub file_path: String,
    pub status: QueueStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

impl ProblematicFile {
    /// Operator action that would unstick this entry
    pub fn remediation(&self) -> &'static str {
        match self.status {
            QueueStatus::Processing => "reset_stuck",
            _ => "force_reset or force_skip",
        }
    }
}

pub struct QueueManager {
    pool: SqlitePool,
    max_attempts: u32,
    stall_threshold_secs: u64,
}

impl QueueManager {
    pub fn new(pool: SqlitePool, max_attempts: u32, stall_threshold_secs: u64) -> Self {
        Self {
            pool,
            max_attempts,
            stall_threshold_secs,
        }
    }

    /// Add a file to the queue as pending, resetting any previous outcome
    pub async fn enqueue(&self, file_path: &str) -> WorkerResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO analysis_queue (file_path, status, attempt_count, last_error, enqueued_at, started_at, updated_at)
            VALUES (?, 'pending', 0, NULL, ?, NULL, ?)
            ON CONFLICT(file_path) DO UPDATE SET
                status = 'pending',
                attempt_count = 0,
                last_error = NULL,
                enqueued_at = excluded.enqueued_at,
                started_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(file_path)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically claim the oldest pending entry
    ///
    /// The status guard on the outer UPDATE makes this safe against
    /// concurrent claimers: only one wins the transition to processing.
    pub async fn claim_next(&self) -> WorkerResult<Option<ClaimedEntry>> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            r#"
            UPDATE analysis_queue
            SET status = 'processing',
                attempt_count = attempt_count + 1,
                started_at = ?,
                updated_at = ?
            WHERE file_path = (
                SELECT file_path FROM analysis_queue
                WHERE status = 'pending'
                ORDER BY enqueued_at
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING file_path, attempt_count
            "#,
        )
        .bind(&now)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ClaimedEntry {
            file_path: row.get("file_path"),
            attempt: row.get::<i64, _>("attempt_count") as u32,
        }))
    }

    /// Mark a claimed entry as successfully analyzed
    pub async fn complete(&self, file_path: &str) -> WorkerResult<()> {
        self.finish(file_path, QueueStatus::Completed, None).await
    }

    /// Mark a claimed entry as skipped (intentionally not analyzed)
    pub async fn skip(&self, file_path: &str, reason: &str) -> WorkerResult<()> {
        self.finish(file_path, QueueStatus::Skipped, Some(reason))
            .await
    }

    /// Record a failure for a claimed entry
    ///
    /// Retryable failures return the entry to pending until attempts run
    /// out; non-retryable failures and exhausted entries go to error.
    pub async fn fail(&self, entry: &ClaimedEntry, error: &WorkerError) -> WorkerResult<()> {
        let retry = error.is_retryable() && entry.attempt < self.max_attempts;
        let reason = error.to_string();

        if retry {
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE analysis_queue SET status = 'pending', last_error = ?, started_at = NULL, updated_at = ? WHERE file_path = ? AND status = 'processing'",
            )
            .bind(&reason)
            .bind(&now)
            .bind(&entry.file_path)
            .execute(&self.pool)
            .await?;

            warn!(
                file = %entry.file_path,
                attempt = entry.attempt,
                error = %reason,
                "Analysis failed, will retry"
            );
        } else {
            self.finish(&entry.file_path, QueueStatus::Error, Some(&reason))
                .await?;

            warn!(
                file = %entry.file_path,
                attempts = entry.attempt,
                error = %reason,
                "Analysis failed permanently"
            );
        }

        Ok(())
    }

    async fn finish(
        &self,
        file_path: &str,
        status: QueueStatus,
        last_error: Option<&str>,
    ) -> WorkerResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE analysis_queue SET status = ?, last_error = ?, updated_at = ? WHERE file_path = ?",
        )
        .bind(status.as_str())
        .bind(last_error)
        .bind(&now)
        .bind(file_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List entries stuck in processing past the stall threshold
    pub async fn list_stuck(&self) -> WorkerResult<Vec<String>> {
        let cutoff = self.stall_cutoff();
        let rows = sqlx::query(
            "SELECT file_path FROM analysis_queue WHERE status = 'processing' AND started_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("file_path")).collect())
    }

    /// Return stalled processing entries to pending
    ///
    /// The attempt already counted when the entry was claimed, so a file
    /// that keeps stalling still exhausts its attempts eventually.
    pub async fn reset_stuck(&self) -> WorkerResult<u64> {
        let cutoff = self.stall_cutoff();
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE analysis_queue
            SET status = CASE WHEN attempt_count >= ? THEN 'error' ELSE 'pending' END,
                last_error = 'stalled in processing',
                started_at = NULL,
                updated_at = ?
            WHERE status = 'processing' AND started_at < ?
            "#,
        )
        .bind(self.max_attempts as i64)
        .bind(&now)
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            info!(count = reset, "Reset stalled queue entries");
        }
        Ok(reset)
    }

    /// Operator action: force an entry back to pending with a fresh attempt count
    pub async fn force_reset(&self, file_path: &str) -> WorkerResult<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE analysis_queue SET status = 'pending', attempt_count = 0, last_error = NULL, started_at = NULL, updated_at = ? WHERE file_path = ?",
        )
        .bind(&now)
        .bind(file_path)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Operator action: permanently skip an entry
    pub async fn force_skip(&self, file_path: &str) -> WorkerResult<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE analysis_queue SET status = 'skipped', last_error = 'skipped by operator', updated_at = ? WHERE file_path = ?",
        )
        .bind(&now)
        .bind(file_path)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove entries for files no longer in the library
    pub async fn remove(&self, file_path: &str) -> WorkerResult<()> {
        sqlx::query("DELETE FROM analysis_queue WHERE file_path = ?")
            .bind(file_path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Per-status counts
    pub async fn counts(&self) -> WorkerResult<QueueCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM analysis_queue GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            match status.as_str() {
                "pending" => counts.pending = n as u64,
                "processing" => counts.processing = n as u64,
                "completed" => counts.completed = n as u64,
                "error" => counts.error = n as u64,
                "skipped" => counts.skipped = n as u64,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Progress summary for status reporting
    pub async fn progress(&self) -> WorkerResult<QueueProgress> {
        let counts = self.counts().await?;
        let total = counts.total();
        let analyzed = counts.completed;
        let percent = if total == 0 {
            100.0
        } else {
            analyzed as f64 / total as f64 * 100.0
        };

        Ok(QueueProgress {
            total,
            analyzed,
            pending: counts.pending + counts.processing,
            failed: counts.error,
            percent,
        })
    }

    /// Files that failed permanently or stalled in processing, most recent first
    pub async fn problematic_files(&self, limit: i64) -> WorkerResult<Vec<ProblematicFile>> {
        let cutoff = self.stall_cutoff();
        let rows = sqlx::query(
            r#"
            SELECT file_path, status, attempt_count, last_error FROM analysis_queue
            WHERE status = 'error'
               OR (status = 'processing' AND started_at < ?)
            ORDER BY updated_at DESC LIMIT ?
            "#,
        )
        .bind(cutoff.to_rfc3339())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let status = match row.get::<String, _>("status").as_str() {
                    "processing" => QueueStatus::Processing,
                    _ => QueueStatus::Error,
                };
                ProblematicFile {
                    file_path: row.get("file_path"),
                    status,
                    attempt_count: row.get::<i64, _>("attempt_count") as u32,
                    last_error: row.get("last_error"),
                }
            })
            .collect())
    }

    fn stall_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - ChronoDuration::seconds(self.stall_threshold_secs as i64)
    }
}
