//! yt-dlp backed extractor
//!
//! Metadata comes from `yt-dlp --dump-json`. yt-dlp already resolves the
//! signed media URL of every format, so streams are fetched directly over
//! HTTP with the headers yt-dlp reports for that format.
//! Includes deno runtime detection for JavaScript-based extractors.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use super::{ByteStream, FormatDescriptor, StreamExtractor, VideoInfo};
use crate::error::JobError;

lazy_static! {
    static ref VIDEO_URL: Regex = Regex::new(
        r"^https?://(?:(?:www|m|music|gaming)\.)?(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|embed/|v/|shorts/|live/)|youtu\.be/|youtube-nocookie\.com/embed/)([A-Za-z0-9_-]{11})(?:[?&#/].*)?$"
    )
    .expect("video URL pattern is valid");
}

const NOT_FOUND_HINT: &str = "yt-dlp not found. Install with: pip install yt-dlp";

/// Find yt-dlp executable, checking common install locations
pub fn find_ytdlp() -> Option<PathBuf> {
    // First check if yt-dlp is in PATH
    if let Ok(output) = std::process::Command::new("yt-dlp").arg("--version").output() {
        if output.status.success() {
            return Some(PathBuf::from("yt-dlp"));
        }
    }

    // On Windows, check common Python user install locations
    #[cfg(windows)]
    {
        for var in ["APPDATA", "LOCALAPPDATA"] {
            if let Ok(base) = std::env::var(var) {
                let python_dir = if var == "APPDATA" {
                    PathBuf::from(&base).join("Python")
                } else {
                    PathBuf::from(&base).join("Programs").join("Python")
                };
                if let Ok(entries) = std::fs::read_dir(python_dir) {
                    for entry in entries.flatten() {
                        let scripts = entry.path().join("Scripts").join("yt-dlp.exe");
                        if scripts.exists() {
                            return Some(scripts);
                        }
                    }
                }
            }
        }
    }

    // pip --user on Unix
    #[cfg(unix)]
    {
        if let Ok(home) = std::env::var("HOME") {
            let local = PathBuf::from(home).join(".local").join("bin").join("yt-dlp");
            if local.exists() {
                return Some(local);
            }
        }
    }

    None
}

/// Find deno executable for yt-dlp JavaScript runtime
pub fn find_deno() -> Option<PathBuf> {
    if let Ok(output) = std::process::Command::new("deno").arg("--version").output() {
        if output.status.success() {
            return Some(PathBuf::from("deno"));
        }
    }
    None
}

/// Extractor that shells out to yt-dlp for metadata
pub struct YtDlpExtractor {
    ytdlp: PathBuf,
    deno: Option<PathBuf>,
    client: reqwest::Client,
    metadata_timeout: Option<Duration>,
}

impl YtDlpExtractor {
    pub fn new(ytdlp: PathBuf) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            ytdlp,
            deno: find_deno(),
            client,
            metadata_timeout: None,
        })
    }

    pub fn with_metadata_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Build yt-dlp args with deno runtime if available
    fn runtime_args(&self) -> Vec<String> {
        match &self.deno {
            Some(deno) => vec![
                "--js-runtimes".to_string(),
                format!("deno:{}", deno.to_string_lossy()),
            ],
            None => vec![],
        }
    }

    async fn dump_json(&self, url: &str) -> Result<Vec<u8>, JobError> {
        let mut cmd = TokioCommand::new(&self.ytdlp);
        cmd.args(self.runtime_args())
            .args(["--dump-json", "--no-playlist", url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {} --dump-json {}", self.ytdlp.display(), url);

        let result = match self.metadata_timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| JobError::Upstream(format!("yt-dlp timed out after {}s", limit.as_secs())))?,
            None => cmd.output().await,
        };

        match result {
            Ok(output) if output.status.success() => Ok(output.stdout),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("yt-dlp failed: {}", stderr.trim());
                Err(JobError::Upstream(
                    stderr.lines().last().unwrap_or("Unknown error").to_string(),
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(JobError::Upstream(NOT_FOUND_HINT.to_string()))
            }
            Err(e) => Err(JobError::Upstream(e.to_string())),
        }
    }
}

#[async_trait]
impl StreamExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn validate_url(&self, url: &str) -> bool {
        VIDEO_URL.is_match(url.trim())
    }

    async fn get_info(&self, url: &str) -> Result<VideoInfo, JobError> {
        let stdout = self.dump_json(url).await?;
        let info: Value = serde_json::from_slice(&stdout)
            .map_err(|e| JobError::Upstream(format!("Failed to parse yt-dlp output: {}", e)))?;

        let info = parse_info(&info);
        info!("Fetched info for \"{}\" ({} formats)", info.title, info.formats.len());
        Ok(info)
    }

    async fn open(&self, _url: &str, format: &FormatDescriptor) -> Result<ByteStream, JobError> {
        if !format.is_direct() {
            return Err(JobError::Upstream(format!(
                "Format {} has no direct stream URL (protocol {})",
                format.itag,
                format.protocol.as_deref().unwrap_or("unknown")
            )));
        }

        let mut request = self.client.get(&format.url);
        for (name, value) in &format.http_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| JobError::Upstream(format!("Failed to open format {}: {}", format.itag, e)))?;

        debug!(
            "Opened format {} ({} bytes)",
            format.itag,
            response.content_length().map(|l| l.to_string()).unwrap_or_else(|| "unknown".into())
        );

        Ok(response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed())
    }

    async fn available(&self) -> bool {
        TokioCommand::new(&self.ytdlp)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Map a `--dump-json` document onto [`VideoInfo`]
fn parse_info(info: &Value) -> VideoInfo {
    let title = info.get("title").and_then(|v| v.as_str()).unwrap_or("Unknown").to_string();

    let formats = info
        .get("formats")
        .and_then(|v| v.as_array())
        .map(|formats| {
            formats
                .iter()
                .enumerate()
                .map(|(index, fmt)| parse_format(index, fmt))
                .collect()
        })
        .unwrap_or_default();

    VideoInfo { title, formats }
}

/// Formats without a `format_id` are kept and named by their position
fn parse_format(index: usize, fmt: &Value) -> FormatDescriptor {
    let itag = match fmt.get("format_id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => index.to_string(),
    };

    let vcodec = fmt.get("vcodec").and_then(|v| v.as_str()).unwrap_or("none");
    let acodec = fmt.get("acodec").and_then(|v| v.as_str()).unwrap_or("none");
    let has_video = vcodec != "none";
    let has_audio = acodec != "none";

    let ext = fmt.get("ext").and_then(|v| v.as_str()).filter(|e| !e.is_empty());
    let height = fmt.get("height").and_then(|v| v.as_u64()).map(|h| h as u32);
    let fps = fmt.get("fps").and_then(|v| v.as_f64());

    let quality = match height {
        Some(h) if has_video => match fps {
            Some(f) if f > 30.0 => format!("{}p{:.0}", h, f),
            _ => format!("{}p", h),
        },
        _ => "Unknown".to_string(),
    };

    let http_headers = fmt
        .get("http_headers")
        .and_then(|v| v.as_object())
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    FormatDescriptor {
        itag,
        quality,
        mime_type: mime_type(ext.unwrap_or(""), has_video, has_audio),
        has_video,
        has_audio,
        audio_bitrate: if has_audio { fmt.get("abr").and_then(|v| v.as_f64()) } else { None },
        url: fmt.get("url").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        container: ext.map(str::to_string),
        height,
        fps,
        bitrate: fmt.get("tbr").and_then(|v| v.as_f64()),
        http_headers,
        protocol: fmt
            .get("protocol")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty())
            .map(str::to_string),
    }
}

fn mime_type(ext: &str, has_video: bool, has_audio: bool) -> String {
    let subtype = match ext {
        "" => "octet-stream",
        "m4a" => "mp4",
        "mp3" => "mpeg",
        other => other,
    };

    if has_video {
        format!("video/{}", subtype)
    } else if has_audio {
        format!("audio/{}", subtype)
    } else {
        format!("application/{}", subtype)
    }
}
