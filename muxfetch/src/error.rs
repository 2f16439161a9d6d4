//! Error taxonomy shared by the endpoints and the background jobs

use warp::http::StatusCode;

use crate::protocol::error_codes;

/// Everything that can go wrong between receiving a URL and writing the merged file.
///
/// Payloads are plain strings so the error can be cloned into a job status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Invalid URL: {0}")]
    InvalidInput(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("No suitable format: {0}")]
    NoSuitableFormat(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Merge failed: {0}")]
    Merge(String),
}

impl JobError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => error_codes::INVALID_URL,
            Self::Upstream(_) => error_codes::UPSTREAM_ERROR,
            Self::NoSuitableFormat(_) => error_codes::NO_SUITABLE_FORMAT,
            Self::Io(_) => error_codes::IO_ERROR,
            Self::Merge(_) => error_codes::MERGE_FAILED,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::NoSuitableFormat(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::Io(_) | Self::Merge(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to an HTTP client.
    /// Server-side failures stay opaque; the details go to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidInput(_) | Self::NoSuitableFormat(_) => self.to_string(),
            Self::Upstream(_) => "Failed to fetch video information".to_string(),
            Self::Io(_) | Self::Merge(_) => "Internal server error".to_string(),
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
