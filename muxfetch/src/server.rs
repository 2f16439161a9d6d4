//! HTTP server implementation

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

use crate::error::JobError;
use crate::job;
use crate::protocol::{
    error_codes, ErrorResponse, FormatsResponse, HealthResponse, JobListResponse, MessageResponse,
    UrlRequest,
};
use crate::state::AppState;

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Request headers a browser preflight may ask for
const ALLOWED_HEADERS: &[&str] = &[
    "accept",
    "accept-language",
    "authorization",
    "cache-control",
    "content-language",
    "content-type",
    "origin",
    "pragma",
    "range",
    "x-requested-with",
];

/// Server configuration
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

/// Serve the API until Ctrl-C, then cancel whatever is still running
pub async fn run(config: ServerConfig, state: Arc<AppState>) -> Result<()> {
    let addr = SocketAddr::new(config.host, config.port);
    let shutdown_state = state.clone();

    let (bound, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested, stopping server...");
        shutdown_state.jobs.cancel_all();
    })?;

    info!("HTTP server listening on http://{}", bound);
    server.await;
    Ok(())
}

/// All API routes, with CORS and JSON error bodies
pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
        .allow_headers(ALLOWED_HEADERS.to_vec());

    let formats = warp::path!("formats")
        .and(warp::post())
        .and(url_body())
        .and(with_state(state.clone()))
        .and_then(list_formats);

    let download = warp::path!("download")
        .and(warp::post())
        .and(url_body())
        .and(with_state(state.clone()))
        .and_then(start_download);

    let jobs = warp::path!("jobs")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_jobs);

    let get_job = warp::path!("jobs" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(job_status);

    let delete_job = warp::path!("jobs" / String)
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(cancel_job);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state))
        .and_then(health);

    formats
        .or(download)
        .or(jobs)
        .or(get_job)
        .or(delete_job)
        .or(health)
        .recover(handle_rejection)
        .with(cors)
        // Only a refused preflight gets here
        .recover(handle_rejection)
}

fn with_state(state: Arc<AppState>) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn url_body() -> impl Filter<Extract = (UrlRequest,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn reply_json<T: Serialize>(body: &T, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn error_reply(err: &JobError) -> WithStatus<Json> {
    reply_json(&ErrorResponse::new(err.code(), err.public_message()), err.status())
}

fn log_job_error(context: &str, err: &JobError) {
    match err {
        JobError::InvalidInput(_) | JobError::NoSuitableFormat(_) => warn!("{}: {}", context, err),
        _ => error!("{}: {}", context, err),
    }
}

fn parse_job_id(raw: &str) -> Result<Uuid, WithStatus<Json>> {
    Uuid::parse_str(raw).map_err(|_| {
        reply_json(
            &ErrorResponse::new(error_codes::INVALID_JOB_ID, format!("Invalid job id: {}", raw)),
            StatusCode::BAD_REQUEST,
        )
    })
}

fn job_not_found(id: Uuid) -> WithStatus<Json> {
    reply_json(
        &ErrorResponse::new(error_codes::JOB_NOT_FOUND, format!("Job not found: {}", id)),
        StatusCode::NOT_FOUND,
    )
}

/// `POST /formats`
async fn list_formats(body: UrlRequest, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let extractor = state.extractor.as_ref();

    if !extractor.validate_url(&body.url) {
        let err = JobError::InvalidInput(body.url);
        log_job_error("Rejected /formats request", &err);
        return Ok(error_reply(&err));
    }

    match extractor.get_info(&body.url).await {
        Ok(info) => Ok(reply_json(&FormatsResponse { formats: info.formats }, StatusCode::OK)),
        Err(e) => {
            log_job_error("Failed to fetch formats", &e);
            Ok(error_reply(&e))
        }
    }
}

/// `POST /download`: answers as soon as the job is running in the background
async fn start_download(body: UrlRequest, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let planned = job::prepare(state.extractor.as_ref(), &body.url, &state.download_dir).await;
    let job = match planned {
        Ok(job) => job,
        Err(e) => {
            log_job_error("Rejected /download request", &e);
            return Ok(error_reply(&e));
        }
    };

    let handle = job.handle();
    state.jobs.insert(handle.clone());
    job::spawn(job, handle.clone(), state.extractor.clone(), state.merger.clone());

    Ok(reply_json(
        &MessageResponse::new("Video and audio download started").with_job(handle.id()),
        StatusCode::OK,
    ))
}

/// `GET /jobs`
async fn list_jobs(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    Ok(reply_json(&JobListResponse { jobs: state.jobs.list() }, StatusCode::OK))
}

/// `GET /jobs/{id}`
async fn job_status(id: String, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(reply) => return Ok(reply),
    };

    match state.jobs.get(&id) {
        Some(handle) => Ok(reply_json(&handle.summary(), StatusCode::OK)),
        None => Ok(job_not_found(id)),
    }
}

/// `DELETE /jobs/{id}`
async fn cancel_job(id: String, state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(reply) => return Ok(reply),
    };

    let Some(handle) = state.jobs.get(&id) else {
        return Ok(job_not_found(id));
    };

    if handle.cancel() {
        info!("Job {} cancelled by client", id);
        Ok(reply_json(&MessageResponse::new("Job cancelled").with_job(id), StatusCode::OK))
    } else {
        Ok(reply_json(
            &ErrorResponse::new(error_codes::JOB_FINISHED, format!("Job {} already finished", id)),
            StatusCode::CONFLICT,
        ))
    }
}

/// `GET /health`
async fn health(state: Arc<AppState>) -> Result<impl Reply, Infallible> {
    let (extractor_available, merger_available) =
        tokio::join!(state.extractor.available(), state.merger.available());

    Ok(reply_json(
        &HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extractor: state.extractor.name().to_string(),
            extractor_available,
            merger: state.merger.name().to_string(),
            merger_available,
            active_jobs: state.jobs.active_count(),
        },
        StatusCode::OK,
    ))
}

/// Turn warp rejections into the same JSON error shape the handlers use
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, error_codes::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, error_codes::INVALID_BODY, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            error_codes::INVALID_BODY,
            "Expected a JSON body".to_string(),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            error_codes::INVALID_BODY,
            "Content-Length required".to_string(),
        )
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            error_codes::PAYLOAD_TOO_LARGE,
            "Request body too large".to_string(),
        )
    } else if let Some(e) = err.find::<warp::filters::cors::CorsForbidden>() {
        warn!("CORS request refused: {}", e);
        (StatusCode::FORBIDDEN, error_codes::CORS_FORBIDDEN, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            error_codes::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            "Internal Server Error".to_string(),
        )
    };

    Ok(reply_json(&ErrorResponse::new(code, message), status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{audio_format, video_format, StreamExtractor};
    use crate::merge::MediaMerger;
    use crate::testing::{wait_terminal, FakeExtractor, FakeMerger, Payload};
    use serde_json::{json, Value};
    use std::path::Path;
    use std::time::Duration;

    const URL: &str = "https://valid.example/watch?id=1";

    fn scenario_extractor() -> FakeExtractor {
        FakeExtractor::new(
            "My: Video",
            vec![video_format("137", 1080, Some("mp4")), audio_format("140", 128.0, Some("m4a"))],
        )
        .with_payload("137", Payload::bytes(b"video"))
        .with_payload("140", Payload::bytes(b"audio"))
    }

    fn app(extractor: Arc<FakeExtractor>, merger: Arc<FakeMerger>, dir: &Path) -> Arc<AppState> {
        let extractor: Arc<dyn StreamExtractor> = extractor;
        let merger: Arc<dyn MediaMerger> = merger;
        Arc::new(AppState::new(extractor, merger, dir.to_path_buf()))
    }

    async fn post(state: &Arc<AppState>, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = warp::test::request()
            .method("POST")
            .path(path)
            .json(&body)
            .reply(&routes(state.clone()))
            .await;
        (resp.status(), serde_json::from_slice(resp.body()).unwrap())
    }

    async fn send(state: &Arc<AppState>, method: &str, path: &str) -> (StatusCode, Value) {
        let resp = warp::test::request()
            .method(method)
            .path(path)
            .reply(&routes(state.clone()))
            .await;
        (resp.status(), serde_json::from_slice(resp.body()).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_by_both_endpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let extractor = Arc::new(scenario_extractor());
        let state = app(extractor.clone(), Arc::new(FakeMerger::new()), tmp.path());

        for path in ["/formats", "/download"] {
            let (status, body) = post(&state, path, json!({ "url": "not-a-url" })).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
            assert_eq!(body["code"], "INVALID_URL");
            assert!(body["error"].is_string());
        }

        // A missing url is just another invalid url
        let (status, _) = post(&state, "/formats", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(extractor.info_calls(), 0);
    }

    #[tokio::test]
    async fn test_formats_lists_everything_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut muxed = video_format("18", 360, Some("mp4"));
        muxed.has_audio = true;
        let extractor = Arc::new(FakeExtractor::new(
            "t",
            vec![
                audio_format("140", 128.0, Some("m4a")),
                muxed,
                video_format("137", 1080, Some("mp4")),
                video_format("137", 1080, Some("mp4")),
            ],
        ));
        let state = app(extractor, Arc::new(FakeMerger::new()), tmp.path());

        let (status, body) = post(&state, "/formats", json!({ "url": URL })).await;
        assert_eq!(status, StatusCode::OK);

        let itags: Vec<_> = body["formats"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["itag"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(itags, vec!["140", "18", "137", "137"]);
        assert_eq!(body["formats"][1]["hasAudio"], true);
        assert_eq!(body["formats"][2]["quality"], "1080p");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_opaque_500() {
        let tmp = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::failing("Sign in to confirm you're not a bot"));
        let state = app(extractor, Arc::new(FakeMerger::new()), tmp.path());

        for path in ["/formats", "/download"] {
            let (status, body) = post(&state, path, json!({ "url": URL })).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["code"], "UPSTREAM_ERROR");
            assert!(!body["error"].as_str().unwrap().contains("bot"));
        }
    }

    #[tokio::test]
    async fn test_download_without_pure_streams() {
        let tmp = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::new("t", vec![video_format("137", 1080, None)]));
        let state = app(extractor.clone(), Arc::new(FakeMerger::new()), tmp.path());

        let (status, body) = post(&state, "/download", json!({ "url": URL })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "NO_SUITABLE_FORMAT");
        assert_eq!(extractor.open_calls(), 0);
        assert!(state.jobs.list().is_empty());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_responds_then_merges_in_background() {
        let tmp = tempfile::tempdir().unwrap();
        let merger = Arc::new(FakeMerger::new());
        let state = app(Arc::new(scenario_extractor()), merger.clone(), tmp.path());

        let (status, body) = post(&state, "/download", json!({ "url": URL })).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());

        let id = Uuid::parse_str(body["jobId"].as_str().unwrap()).unwrap();
        let handle = state.jobs.get(&id).unwrap();
        let job_dir = tmp.path().join(id.to_string());
        let output = job_dir.join("My Video.mp4");

        assert_eq!(wait_terminal(&handle).await, job::JobStatus::Merged { output: output.clone() });
        assert!(output.exists());
        assert!(!job_dir.join("My Video_video.mp4").exists());
        assert!(!job_dir.join("My Video_audio.m4a").exists());
        assert_eq!(merger.calls(), 1);

        let (status, body) = send(&state, "GET", &format!("/jobs/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "My Video");
        assert_eq!(body["status"]["state"], "merged");
        assert_eq!(body["output"], output.to_string_lossy().as_ref());

        let (status, body) = send(&state, "GET", "/jobs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobs"].as_array().unwrap().len(), 1);

        // Finished jobs cannot be cancelled
        let (status, body) = send(&state, "DELETE", &format!("/jobs/{}", id)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "JOB_FINISHED");
    }

    #[tokio::test]
    async fn test_same_title_jobs_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let state = app(Arc::new(scenario_extractor()), Arc::new(FakeMerger::new()), tmp.path());

        let (_, first) = post(&state, "/download", json!({ "url": URL })).await;
        let (_, second) = post(&state, "/download", json!({ "url": URL })).await;
        assert_ne!(first["jobId"], second["jobId"]);

        for body in [first, second] {
            let id = Uuid::parse_str(body["jobId"].as_str().unwrap()).unwrap();
            let handle = state.jobs.get(&id).unwrap();
            assert!(matches!(wait_terminal(&handle).await, job::JobStatus::Merged { .. }));
            assert!(tmp.path().join(id.to_string()).join("My Video.mp4").exists());
        }
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let tmp = tempfile::tempdir().unwrap();
        let extractor = Arc::new(
            FakeExtractor::new(
                "Slow",
                vec![video_format("137", 1080, None), audio_format("140", 128.0, None)],
            )
            .with_payload("137", Payload::bytes(b"v").delayed(Duration::from_secs(30)))
            .with_payload("140", Payload::bytes(b"a").delayed(Duration::from_secs(30))),
        );
        let merger = Arc::new(FakeMerger::new());
        let state = app(extractor, merger.clone(), tmp.path());

        let (_, body) = post(&state, "/download", json!({ "url": URL })).await;
        let id = body["jobId"].as_str().unwrap().to_string();

        let (status, body) = send(&state, "DELETE", &format!("/jobs/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobId"], id.as_str());

        let (_, body) = send(&state, "GET", &format!("/jobs/{}", id)).await;
        assert_eq!(body["status"]["state"], "cancelled");
        assert_eq!(merger.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_job_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let state = app(Arc::new(scenario_extractor()), Arc::new(FakeMerger::new()), tmp.path());

        let (status, body) = send(&state, "GET", &format!("/jobs/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "JOB_NOT_FOUND");

        let (status, body) = send(&state, "GET", "/jobs/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_JOB_ID");

        let (status, _) = send(&state, "DELETE", &format!("/jobs/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_body_and_unknown_route() {
        let tmp = tempfile::tempdir().unwrap();
        let state = app(Arc::new(scenario_extractor()), Arc::new(FakeMerger::new()), tmp.path());

        let resp = warp::test::request()
            .method("POST")
            .path("/download")
            .header("content-type", "application/json")
            .body("{ not json")
            .reply(&routes(state.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "INVALID_BODY");

        let (status, body) = send(&state, "GET", "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_preflight_accepts_common_headers() {
        let tmp = tempfile::tempdir().unwrap();
        let state = app(Arc::new(scenario_extractor()), Arc::new(FakeMerger::new()), tmp.path());

        let resp = warp::test::request()
            .method("OPTIONS")
            .path("/download")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type,x-requested-with")
            .reply(&routes(state.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("access-control-allow-origin"));

        let resp = warp::test::request()
            .method("OPTIONS")
            .path("/download")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "PATCH")
            .reply(&routes(state))
            .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "CORS_FORBIDDEN");
    }

    #[tokio::test]
    async fn test_error_replies_carry_cors_headers() {
        let tmp = tempfile::tempdir().unwrap();
        let state = app(Arc::new(scenario_extractor()), Arc::new(FakeMerger::new()), tmp.path());

        let resp = warp::test::request()
            .method("POST")
            .path("/download")
            .header("origin", "http://localhost:5173")
            .header("content-type", "application/json")
            .body("{ not json")
            .reply(&routes(state.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().contains_key("access-control-allow-origin"));

        let resp = warp::test::request()
            .method("GET")
            .path("/nope")
            .header("origin", "http://localhost:5173")
            .reply(&routes(state))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = tempfile::tempdir().unwrap();
        let state = app(Arc::new(scenario_extractor()), Arc::new(FakeMerger::new()), tmp.path());

        let (status, body) = send(&state, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["extractorAvailable"], true);
        assert_eq!(body["activeJobs"], 0);
    }
}
