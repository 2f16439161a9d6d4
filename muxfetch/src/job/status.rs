//! Job status tracking

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::JobError;

/// Download job status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobStatus {
    FormatsSelected,
    #[serde(rename_all = "camelCase")]
    Downloading { video_done: bool, audio_done: bool },
    Merging,
    Merged { output: PathBuf },
    Failed { code: String, error: String },
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged { .. } | Self::Failed { .. } | Self::Cancelled)
    }

    pub fn failed(err: &JobError) -> Self {
        Self::Failed {
            code: err.code().to_string(),
            error: err.to_string(),
        }
    }
}

/// Which half of a job a write belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Video,
    Audio,
}

/// Serializable snapshot of a job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub status: JobStatus,
    pub elapsed_ms: u64,
    /// Merged file, once there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// Shared handle to a running or finished job.
///
/// Once the status is terminal it is committed: every later transition,
/// including a cancel, is ignored.
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    url: String,
    title: String,
    status: Arc<Mutex<JobStatus>>,
    cancel: CancellationToken,
    start_time: Instant,
}

impl JobHandle {
    pub fn new(id: Uuid, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: title.into(),
            status: Arc::new(Mutex::new(JobStatus::FormatsSelected)),
            cancel: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status.lock().clone()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn started_at(&self) -> Instant {
        self.start_time
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Move to `next`. Returns false (and logs) if the job already finished.
    pub fn set_status(&self, next: JobStatus) -> bool {
        let mut status = self.status.lock();
        if status.is_terminal() {
            warn!("Job {}: ignoring {:?}, already {:?}", self.id, next, *status);
            return false;
        }
        debug!("Job {}: {:?} -> {:?}", self.id, *status, next);
        *status = next;
        true
    }

    /// Record that one of the two writes finished
    pub fn mark_written(&self, track: Track) {
        let mut status = self.status.lock();
        if let JobStatus::Downloading { video_done, audio_done } = &mut *status {
            match track {
                Track::Video => *video_done = true,
                Track::Audio => *audio_done = true,
            }
        }
    }

    /// Cancel the job. Returns false if it already reached a terminal state.
    pub fn cancel(&self) -> bool {
        {
            let mut status = self.status.lock();
            if status.is_terminal() {
                return false;
            }
            *status = JobStatus::Cancelled;
        }
        self.cancel.cancel();
        true
    }

    pub fn summary(&self) -> JobSummary {
        let status = self.status();
        let output = match &status {
            JobStatus::Merged { output } => Some(output.clone()),
            _ => None,
        };
        JobSummary {
            id: self.id,
            url: self.url.clone(),
            title: self.title.clone(),
            status,
            elapsed_ms: self.elapsed_ms(),
            output,
        }
    }
}
