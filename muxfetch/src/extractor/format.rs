//! Format descriptors and quality ranking

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

/// Container used when a format does not declare one
pub const DEFAULT_CONTAINER: &str = "mp4";

/// One stream format as reported by the extractor.
///
/// The serialized shape is what `POST /formats` returns; the skipped fields
/// only feed ranking and stream opening.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDescriptor {
    pub itag: String,
    pub quality: String,
    pub mime_type: String,
    pub has_video: bool,
    pub has_audio: bool,
    /// Audio bitrate in kbps
    pub audio_bitrate: Option<f64>,
    /// Resource locator, usually time-limited
    pub url: String,

    #[serde(skip)]
    pub container: Option<String>,
    #[serde(skip)]
    pub height: Option<u32>,
    #[serde(skip)]
    pub fps: Option<f64>,
    /// Total bitrate in kbps
    #[serde(skip)]
    pub bitrate: Option<f64>,
    #[serde(skip)]
    pub http_headers: HashMap<String, String>,
    /// Transfer protocol (`https`, `m3u8_native`, `http_dash_segments`, ...)
    #[serde(skip)]
    pub protocol: Option<String>,
}

impl FormatDescriptor {
    pub fn is_video_only(&self) -> bool {
        self.has_video && !self.has_audio
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }

    /// Whether `url` is the media itself rather than a manifest or playlist
    pub fn is_direct(&self) -> bool {
        !self.url.is_empty()
            && self
                .protocol
                .as_deref()
                .map_or(true, |p| matches!(p, "http" | "https"))
    }

    /// File extension for this format: the declared container, or `mp4`
    pub fn extension(&self) -> &str {
        self.container
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONTAINER)
    }
}

/// Selection criteria for [`choose_format`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// Best video-only format
    HighestVideo,
    /// Best audio-only format
    HighestAudio,
}

/// Pick the best format for `quality`, or `None` if nothing qualifies.
/// Only directly fetchable formats are considered. Ties keep the format
/// listed first.
pub fn choose_format(formats: &[FormatDescriptor], quality: Quality) -> Option<&FormatDescriptor> {
    match quality {
        Quality::HighestVideo => best_by(
            formats.iter().filter(|f| f.is_video_only() && f.is_direct()),
            compare_video,
        ),
        Quality::HighestAudio => best_by(
            formats.iter().filter(|f| f.is_audio_only() && f.is_direct()),
            compare_audio,
        ),
    }
}

fn best_by<'a>(
    candidates: impl Iterator<Item = &'a FormatDescriptor>,
    compare: fn(&FormatDescriptor, &FormatDescriptor) -> Ordering,
) -> Option<&'a FormatDescriptor> {
    candidates.reduce(|best, f| if compare(f, best) == Ordering::Greater { f } else { best })
}

// Height, then frame rate, then bitrate
fn compare_video(a: &FormatDescriptor, b: &FormatDescriptor) -> Ordering {
    a.height
        .unwrap_or(0)
        .cmp(&b.height.unwrap_or(0))
        .then_with(|| a.fps.unwrap_or(0.0).total_cmp(&b.fps.unwrap_or(0.0)))
        .then_with(|| a.bitrate.unwrap_or(0.0).total_cmp(&b.bitrate.unwrap_or(0.0)))
}

// Audio bitrate, then total bitrate
fn compare_audio(a: &FormatDescriptor, b: &FormatDescriptor) -> Ordering {
    a.audio_bitrate
        .unwrap_or(0.0)
        .total_cmp(&b.audio_bitrate.unwrap_or(0.0))
        .then_with(|| a.bitrate.unwrap_or(0.0).total_cmp(&b.bitrate.unwrap_or(0.0)))
}
