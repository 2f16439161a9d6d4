//! Shared application state

use std::path::PathBuf;
use std::sync::Arc;

use crate::extractor::StreamExtractor;
use crate::job::JobRegistry;
use crate::merge::MediaMerger;

pub struct AppState {
    pub extractor: Arc<dyn StreamExtractor>,
    pub merger: Arc<dyn MediaMerger>,
    pub jobs: JobRegistry,
    /// Working directory; every job gets its own subdirectory
    pub download_dir: PathBuf,
}

impl AppState {
    pub fn new(
        extractor: Arc<dyn StreamExtractor>,
        merger: Arc<dyn MediaMerger>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            merger,
            jobs: JobRegistry::new(),
            download_dir,
        }
    }

    /// Retain at most `history` finished jobs for status queries
    pub fn with_job_history(mut self, history: usize) -> Self {
        self.jobs = JobRegistry::with_history(history);
        self
    }
}
