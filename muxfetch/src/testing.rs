//! In-process fakes for the extractor and merger adapters

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::error::JobError;
use crate::extractor::{ByteStream, FormatDescriptor, StreamExtractor, VideoInfo};
use crate::job::{JobHandle, JobStatus};
use crate::merge::{MediaMerger, MergeFailure, MergeOptions};

/// What opening a format yields
#[derive(Clone)]
pub struct Payload {
    data: Vec<u8>,
    delay: Duration,
    error: Option<String>,
}

impl Payload {
    pub fn bytes(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            delay: Duration::ZERO,
            error: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            data: Vec::new(),
            delay: Duration::ZERO,
            error: Some(message.to_string()),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Accepts `https://valid.example/...` URLs and serves canned payloads
pub struct FakeExtractor {
    info: Result<VideoInfo, String>,
    payloads: HashMap<String, Payload>,
    info_calls: AtomicUsize,
    open_calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(title: &str, formats: Vec<FormatDescriptor>) -> Self {
        Self {
            info: Ok(VideoInfo {
                title: title.to_string(),
                formats,
            }),
            payloads: HashMap::new(),
            info_calls: AtomicUsize::new(0),
            open_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            info: Err(message.to_string()),
            ..Self::new("", Vec::new())
        }
    }

    pub fn with_payload(mut self, itag: &str, payload: Payload) -> Self {
        self.payloads.insert(itag.to_string(), payload);
        self
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamExtractor for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn validate_url(&self, url: &str) -> bool {
        url.starts_with("https://valid.example/")
    }

    async fn get_info(&self, _url: &str) -> Result<VideoInfo, JobError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.info.clone().map_err(JobError::Upstream)
    }

    async fn open(&self, _url: &str, format: &FormatDescriptor) -> Result<ByteStream, JobError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let payload = self
            .payloads
            .get(&format.itag)
            .cloned()
            .ok_or_else(|| JobError::Upstream(format!("no payload for {}", format.itag)))?;

        Ok(futures_util::stream::once(async move {
            tokio::time::sleep(payload.delay).await;
            match payload.error {
                Some(message) => Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, message)),
                None => Ok(Bytes::from(payload.data)),
            }
        })
        .boxed())
    }
}

/// Concatenates its inputs into the output, or fails after leaving a partial file
pub struct FakeMerger {
    fail: bool,
    stall: bool,
    calls: AtomicUsize,
}

impl FakeMerger {
    pub fn new() -> Self {
        Self {
            fail: false,
            stall: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Writes a partial output, then never finishes
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaMerger for FakeMerger {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        options: &MergeOptions,
    ) -> Result<(), MergeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(options, &MergeOptions::default());

        if self.stall {
            let _ = tokio::fs::write(output, b"partial").await;
            std::future::pending::<()>().await;
        }

        if self.fail {
            let _ = tokio::fs::write(output, b"partial").await;
            return Err(MergeFailure {
                message: "ffmpeg exited with exit status: 1".to_string(),
                stdout: String::new(),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }

        let mut merged = tokio::fs::read(video)
            .await
            .map_err(|e| MergeFailure::new(e.to_string()))?;
        merged.extend(
            tokio::fs::read(audio)
                .await
                .map_err(|e| MergeFailure::new(e.to_string()))?,
        );
        tokio::fs::write(output, merged)
            .await
            .map_err(|e| MergeFailure::new(e.to_string()))
    }
}

/// Poll until the job reaches a terminal state
pub async fn wait_terminal(handle: &JobHandle) -> JobStatus {
    for _ in 0..1000 {
        let status = handle.status();
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never finished: {:?}", handle.id(), handle.status());
}
