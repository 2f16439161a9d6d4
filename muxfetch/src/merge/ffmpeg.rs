//! FFmpeg CLI merger

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use super::{MediaMerger, MergeFailure, MergeOptions};

/// Check whether `ffmpeg -version` runs
pub fn ffmpeg_available(ffmpeg: &Path) -> bool {
    std::process::Command::new(ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Merges streams by running the ffmpeg binary
pub struct FfmpegMerger {
    ffmpeg: PathBuf,
}

impl FfmpegMerger {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }

    /// Build FFmpeg command line arguments
    fn build_args(video: &Path, audio: &Path, output: &Path, options: &MergeOptions) -> Vec<String> {
        vec![
            "-y".to_string(), // Overwrite output
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c:v".to_string(),
            options.video_codec.clone(),
            "-c:a".to_string(),
            options.audio_codec.clone(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl MediaMerger for FfmpegMerger {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        options: &MergeOptions,
    ) -> Result<(), MergeFailure> {
        let args = Self::build_args(video, audio, output, options);
        debug!("FFmpeg args: {:?}", args);

        // Dropping the future (job cancelled) kills the child
        let result = TokioCommand::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        match result {
            Ok(out) if out.status.success() => {
                info!("FFmpeg finished: {}", output.display());
                Ok(())
            }
            Ok(out) => Err(MergeFailure {
                message: format!("ffmpeg exited with {}", out.status),
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MergeFailure::new(format!(
                "ffmpeg not found at {}",
                self.ffmpeg.display()
            ))),
            Err(e) => Err(MergeFailure::new(format!("Failed to start ffmpeg: {}", e))),
        }
    }

    async fn available(&self) -> bool {
        let ffmpeg = self.ffmpeg.clone();
        tokio::task::spawn_blocking(move || ffmpeg_available(&ffmpeg))
            .await
            .unwrap_or(false)
    }
}
