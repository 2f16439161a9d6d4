//! Media merge adapter

mod ffmpeg;

use std::path::Path;

use async_trait::async_trait;

pub use ffmpeg::{ffmpeg_available, FfmpegMerger};

/// Codec settings for a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub video_codec: String,
    pub audio_codec: String,
}

impl Default for MergeOptions {
    /// Video is copied untouched, audio re-encoded to AAC
    fn default() -> Self {
        Self {
            video_codec: "copy".to_string(),
            audio_codec: "aac".to_string(),
        }
    }
}

/// A failed merge, with whatever the tool printed
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct MergeFailure {
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl MergeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

#[async_trait]
pub trait MediaMerger: Send + Sync {
    /// Name of the merger (for logging)
    fn name(&self) -> &'static str;

    /// Mux `video` and `audio` into `output`
    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        options: &MergeOptions,
    ) -> Result<(), MergeFailure>;

    /// Whether the backing tool is usable
    async fn available(&self) -> bool {
        true
    }
}
