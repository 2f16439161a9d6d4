//! Message types for the HTTP API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extractor::FormatDescriptor;
use crate::job::JobSummary;

/// Body of `POST /formats` and `POST /download`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlRequest {
    /// Missing URLs deserialize to empty and fail validation like any other bad URL
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatsResponse {
    pub formats: Vec<FormatDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            job_id: None,
        }
    }

    pub fn with_job(mut self, id: Uuid) -> Self {
        self.job_id = Some(id);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
}

/// Health check info
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub extractor: String,
    pub extractor_available: bool,
    pub merger: String,
    pub merger_available: bool,
    pub active_jobs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_url_defaults_to_empty() {
        let req: UrlRequest = serde_json::from_str("{}").unwrap();
        assert!(req.url.is_empty());
    }

    #[test]
    fn test_message_omits_absent_job_id() {
        let json = serde_json::to_value(MessageResponse::new("done")).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "done" }));

        let id = Uuid::new_v4();
        let json = serde_json::to_value(MessageResponse::new("started").with_job(id)).unwrap();
        assert_eq!(json["jobId"], serde_json::json!(id.to_string()));
    }
}
