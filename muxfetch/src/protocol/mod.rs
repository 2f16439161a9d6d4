//! Protocol module - JSON request and response bodies

mod messages;

pub use messages::*;

/// Error codes
pub mod error_codes {
    pub const INVALID_URL: &str = "INVALID_URL";
    pub const INVALID_BODY: &str = "INVALID_BODY";
    pub const INVALID_JOB_ID: &str = "INVALID_JOB_ID";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const NO_SUITABLE_FORMAT: &str = "NO_SUITABLE_FORMAT";
    pub const IO_ERROR: &str = "IO_ERROR";
    pub const MERGE_FAILED: &str = "MERGE_FAILED";
    pub const JOB_NOT_FOUND: &str = "JOB_NOT_FOUND";
    pub const JOB_FINISHED: &str = "JOB_FINISHED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CORS_FORBIDDEN: &str = "CORS_FORBIDDEN";
    pub const METHOD_NOT_ALLOWED: &str = "METHOD_NOT_ALLOWED";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}
