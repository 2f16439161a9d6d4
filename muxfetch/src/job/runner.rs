//! Download orchestration: plan, two concurrent writes, join, merge, cleanup

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::status::{JobHandle, JobStatus, Track};
use crate::error::JobError;
use crate::extractor::{FormatDescriptor, Quality, StreamExtractor};
use crate::merge::{MediaMerger, MergeOptions};
use crate::utils;

/// Everything needed to run one download + merge
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub video_format: FormatDescriptor,
    pub audio_format: FormatDescriptor,
    /// Per-job directory, so jobs for the same title never collide
    pub dir: PathBuf,
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
}

impl DownloadJob {
    pub fn new(
        url: impl Into<String>,
        title: &str,
        video_format: FormatDescriptor,
        audio_format: FormatDescriptor,
        download_dir: &Path,
    ) -> Self {
        let id = Uuid::new_v4();
        let stem = utils::file_stem(title);
        let dir = download_dir.join(id.to_string());

        Self {
            id,
            url: url.into(),
            video_path: dir.join(format!("{}_video.{}", stem, video_format.extension())),
            audio_path: dir.join(format!("{}_audio.{}", stem, audio_format.extension())),
            output_path: dir.join(format!("{}.mp4", stem)),
            title: stem,
            video_format,
            audio_format,
            dir,
        }
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle::new(self.id, self.url.clone(), self.title.clone())
    }
}

/// The synchronous half of a download request: validate, fetch metadata,
/// pick formats and derive paths. Nothing touches the disk yet.
pub async fn prepare(
    extractor: &dyn StreamExtractor,
    url: &str,
    download_dir: &Path,
) -> Result<DownloadJob, JobError> {
    if !extractor.validate_url(url) {
        return Err(JobError::InvalidInput(url.to_string()));
    }

    let info = extractor.get_info(url).await?;

    let video = extractor.choose_format(&info.formats, Quality::HighestVideo);
    let audio = extractor.choose_format(&info.formats, Quality::HighestAudio);
    let (video, audio) = match (video, audio) {
        (Some(v), Some(a)) => (v, a),
        (None, _) => return Err(JobError::NoSuitableFormat("no video-only stream".to_string())),
        (_, None) => return Err(JobError::NoSuitableFormat("no audio-only stream".to_string())),
    };

    let job = DownloadJob::new(url, &info.title, video, audio, download_dir);
    info!(
        "Job {}: \"{}\" video={} ({}) audio={} ({})",
        job.id,
        job.title,
        job.video_format.itag,
        job.video_format.quality,
        job.audio_format.itag,
        job.audio_format.audio_bitrate.map(|b| format!("{:.0}kbps", b)).unwrap_or_default(),
    );
    Ok(job)
}

/// Run `job` in the background. The returned task ends once the job reached
/// a terminal state (or was cancelled).
pub fn spawn(
    job: DownloadJob,
    handle: JobHandle,
    extractor: Arc<dyn StreamExtractor>,
    merger: Arc<dyn MediaMerger>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let token = handle.cancellation_token();

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            r = run(&job, &handle, extractor.as_ref(), merger.as_ref()) => Some(r),
        };

        match result {
            None => {
                info!("Job {} cancelled", job.id);
                // A merge killed midway leaves a truncated output behind
                if let Err(e) = utils::remove_if_exists(&job.output_path).await {
                    warn!("Could not remove partial output {}: {}", job.output_path.display(), e);
                }
            }
            Some(Ok(())) => {
                handle.set_status(JobStatus::Merged { output: job.output_path.clone() });
            }
            Some(Err(e)) => {
                error!("Job {} failed: {}", job.id, e);
                handle.set_status(JobStatus::failed(&e));
            }
        }
    })
}

async fn run(
    job: &DownloadJob,
    handle: &JobHandle,
    extractor: &dyn StreamExtractor,
    merger: &dyn MediaMerger,
) -> Result<(), JobError> {
    tokio::fs::create_dir_all(&job.dir).await?;
    handle.set_status(JobStatus::Downloading { video_done: false, audio_done: false });

    let video = async {
        let bytes = write_stream(extractor, &job.url, &job.video_format, &job.video_path).await?;
        info!("Video saved to {} ({} bytes)", job.video_path.display(), bytes);
        handle.mark_written(Track::Video);
        Ok::<_, JobError>(())
    };
    let audio = async {
        let bytes = write_stream(extractor, &job.url, &job.audio_format, &job.audio_path).await?;
        info!("Audio saved to {} ({} bytes)", job.audio_path.display(), bytes);
        handle.mark_written(Track::Audio);
        Ok::<_, JobError>(())
    };

    // Both writes must succeed; the first failure drops the other one
    tokio::try_join!(video, audio)?;

    handle.set_status(JobStatus::Merging);
    merge_and_cleanup(merger, job).await
}

/// Copy the stream for `format` into a new file at `path`
pub async fn write_stream(
    extractor: &dyn StreamExtractor,
    url: &str,
    format: &FormatDescriptor,
    path: &Path,
) -> Result<u64, JobError> {
    let mut stream = extractor.open(url, format).await?;
    let mut file = tokio::fs::File::create(path).await?;

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

/// Merge both temporaries into the output. On success the temporaries are
/// deleted; on failure they stay and any partial output is removed.
pub async fn merge_and_cleanup(merger: &dyn MediaMerger, job: &DownloadJob) -> Result<(), JobError> {
    info!("Job {}: merging with {}", job.id, merger.name());

    let merged = merger
        .merge(&job.video_path, &job.audio_path, &job.output_path, &MergeOptions::default())
        .await;

    if let Err(failure) = merged {
        error!("Failed to merge audio and video: {}", failure.message);
        if !failure.stdout.trim().is_empty() {
            error!("STDOUT: {}", failure.stdout.trim());
        }
        if !failure.stderr.trim().is_empty() {
            error!("STDERR: {}", failure.stderr.trim());
        }
        if let Err(e) = utils::remove_if_exists(&job.output_path).await {
            warn!("Could not remove partial output {}: {}", job.output_path.display(), e);
        }
        return Err(JobError::Merge(failure.message));
    }

    info!("Merged video written to {}", job.output_path.display());

    tokio::fs::remove_file(&job.video_path).await?;
    tokio::fs::remove_file(&job.audio_path).await?;
    Ok(())
}
