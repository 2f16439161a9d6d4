//! Stream extractor adapter
//!
//! Everything the service knows about a video platform goes through
//! [`StreamExtractor`]: URL validation, metadata, format choice and opening a
//! byte stream for one format.

mod format;
mod ytdlp;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::JobError;

pub use format::{choose_format, FormatDescriptor, Quality};
pub use ytdlp::{find_deno, find_ytdlp, YtDlpExtractor};

#[cfg(test)]
pub(crate) use format::tests::{audio_format, video_format};

/// Readable byte stream for one format
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Metadata snapshot for a URL
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub title: String,
    pub formats: Vec<FormatDescriptor>,
}

#[async_trait]
pub trait StreamExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Whether `url` has the shape of a video URL this extractor accepts.
    /// Must not touch the network.
    fn validate_url(&self, url: &str) -> bool;

    /// Fetch title and every available format
    async fn get_info(&self, url: &str) -> Result<VideoInfo, JobError>;

    /// Pick the best format for `quality`
    fn choose_format(&self, formats: &[FormatDescriptor], quality: Quality) -> Option<FormatDescriptor> {
        choose_format(formats, quality).cloned()
    }

    /// Open a byte stream for `format` of `url`
    async fn open(&self, url: &str, format: &FormatDescriptor) -> Result<ByteStream, JobError>;

    /// Whether the backing tool is usable
    async fn available(&self) -> bool {
        true
    }
}
