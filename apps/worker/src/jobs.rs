//! Generation job tracking
//!
//! Playlist generation runs as a background job identified by a UUID.
//! Callers poll for status snapshots and can request cancellation. Once a
//! job reaches a terminal state it never transitions again.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle states for a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Mutable progress fields behind the job's lock
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobProgress {
    pub rounds_used: u32,
    pub accepted: usize,
    pub rejected: usize,
    pub target: usize,
    pub error: Option<String>,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    progress: JobProgress,
}

/// One playlist generation job
#[derive(Debug)]
pub struct GenerationJob {
    id: Uuid,
    state: Mutex<JobState>,
    cancel: CancellationToken,
}

/// Immutable view of a job for polling
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: JobProgress,
}

impl GenerationJob {
    fn new(target: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(JobState {
                status: JobStatus::Running,
                progress: JobProgress {
                    target,
                    ..Default::default()
                },
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request cancellation; the running generator observes the token
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Transition to a new status
    ///
    /// Terminal states are final; a transition attempt from one is ignored
    /// and returns false.
    pub fn set_status(&self, status: JobStatus) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        true
    }

    /// Record a failure reason and move to Failed
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.status.is_terminal() {
            return false;
        }
        state.progress.error = Some(reason.into());
        state.status = JobStatus::Failed;
        true
    }

    /// Update progress counters
    pub fn update_progress(&self, rounds_used: u32, accepted: usize, rejected: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.progress.rounds_used = rounds_used;
            state.progress.accepted = accepted;
            state.progress.rejected = rejected;
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state
            .lock()
            .map(|s| s.status)
            .unwrap_or(JobStatus::Failed)
    }

    /// Snapshot for status polling
    pub fn snapshot(&self) -> JobSnapshot {
        let (status, progress) = match self.state.lock() {
            Ok(state) => (state.status, state.progress.clone()),
            Err(_) => (JobStatus::Failed, JobProgress::default()),
        };
        JobSnapshot {
            id: self.id,
            status,
            progress,
        }
    }
}

/// In-memory registry of generation jobs
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, Arc<GenerationJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new running job
    pub fn create(&self, target: usize) -> Arc<GenerationJob> {
        let job = Arc::new(GenerationJob::new(target));
        self.jobs.insert(job.id(), Arc::clone(&job));
        job
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<GenerationJob>> {
        self.jobs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Request cancellation of a job; returns false if unknown
    pub fn stop(&self, id: &Uuid) -> bool {
        match self.get(id) {
            Some(job) => {
                job.request_stop();
                true
            }
            None => false,
        }
    }

    /// Drop finished jobs from the registry
    pub fn prune_terminal(&self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| !job.status().is_terminal());
        before - self.jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
