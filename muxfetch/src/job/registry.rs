//! Registry of jobs started by this process

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::status::{JobHandle, JobSummary};

/// Finished jobs kept for status queries unless configured otherwise
pub const DEFAULT_JOB_HISTORY: usize = 256;

/// In-flight jobs plus the most recent finished ones
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobHandle>>,
    history: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_history(DEFAULT_JOB_HISTORY)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `history` finished jobs; in-flight jobs are never evicted
    pub fn with_history(history: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            history,
        }
    }

    pub fn insert(&self, handle: JobHandle) {
        let mut jobs = self.jobs.write();
        jobs.insert(handle.id(), handle);
        evict_finished(&mut jobs, self.history);
    }

    pub fn get(&self, id: &Uuid) -> Option<JobHandle> {
        self.jobs.read().get(id).cloned()
    }

    /// Snapshots of every job, most recent first
    pub fn list(&self) -> Vec<JobSummary> {
        let mut handles: Vec<JobHandle> = self.jobs.read().values().cloned().collect();
        handles.sort_by(|a, b| b.started_at().cmp(&a.started_at()));
        handles.iter().map(JobHandle::summary).collect()
    }

    /// Number of jobs not yet in a terminal state
    pub fn active_count(&self) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|h| !h.status().is_terminal())
            .count()
    }

    /// Cancel every in-flight job, returning how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.jobs.read().values().filter(|h| h.cancel()).count();
        if cancelled > 0 {
            info!("Cancelled {} in-flight job(s)", cancelled);
        }
        cancelled
    }
}

/// Drop the oldest finished jobs beyond `keep`, returning how many went
fn evict_finished(jobs: &mut HashMap<Uuid, JobHandle>, keep: usize) -> usize {
    let mut finished: Vec<(Instant, Uuid)> = jobs
        .values()
        .filter(|h| h.status().is_terminal())
        .map(|h| (h.started_at(), h.id()))
        .collect();
    if finished.len() <= keep {
        return 0;
    }

    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in &finished[..excess] {
        jobs.remove(id);
    }
    debug!("Evicted {} finished job(s) from history", excess);
    excess
}
