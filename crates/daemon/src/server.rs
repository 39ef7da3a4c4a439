//! HTTP surface for fetchd
//!
//! Exposes the authentication, job submission, polling, artifact download,
//! and metadata probe endpoints. Handlers are stateless aside from registry
//! reads; every route except `/auth` requires a valid session cookie.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::io::ReaderStream;

use crate::engine::MediaEngine;
use crate::orchestrator::{JobOrchestrator, SubmitError};
use crate::registry::{JobRegistry, JobState};
use crate::session::SessionGate;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session";

/// Errors that can occur when running the HTTP server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<SessionGate>,
    pub registry: Arc<JobRegistry>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub engine: Arc<dyn MediaEngine>,
}

#[derive(Debug, Deserialize)]
struct AuthRequest {
    password: String,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    source_url: String,
    format_spec: String,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    state: JobState,
    progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeRequest {
    source_url: String,
}

/// Extract the session token from the Cookie header, if any.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "authentication required"})),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "unknown job"})),
    )
        .into_response()
}

/// Reject the request unless it carries a valid session cookie.
fn require_session(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    match session_token(headers) {
        Some(token) if state.gate.validate(&token) => Ok(()),
        _ => Err(unauthorized()),
    }
}

/// Handler for POST /auth
///
/// Verifies the shared password and sets the session cookie. The session
/// gate guarantees both outcomes take at least the configured delay.
async fn auth(State(state): State<AppState>, Json(body): Json<AuthRequest>) -> Response {
    match state.gate.authenticate(&body.password).await {
        Ok(token) => {
            let cookie = format!(
                "{}={}; HttpOnly; Path=/; Max-Age={}",
                SESSION_COOKIE,
                token,
                state.gate.session_ttl().as_secs()
            );
            ([(header::SET_COOKIE, cookie)], Json(json!({"ok": true}))).into_response()
        }
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid password"})),
        )
            .into_response(),
    }
}

/// Handler for POST /jobs
async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequest>,
) -> Response {
    if let Err(response) = require_session(&state, &headers) {
        return response;
    }

    match state.orchestrator.submit(&body.source_url, &body.format_spec) {
        Ok(job_id) => Json(SubmitResponse { job_id }).into_response(),
        Err(SubmitError::InvalidFormat(spec)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unrecognized format spec: {}", spec)})),
        )
            .into_response(),
    }
}

/// Handler for GET /jobs/{job_id}
///
/// Snapshot read of the job state. Expired jobs are indistinguishable from
/// unknown ones.
async fn job_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response {
    if let Err(response) = require_session(&state, &headers) {
        return response;
    }

    match state.registry.get(&job_id) {
        Some(job) if job.state != JobState::Expired => Json(StatusResponse {
            state: job.state,
            progress_percent: job.progress_percent,
            error_message: job.error_message,
        })
        .into_response(),
        _ => not_found(),
    }
}

/// Handler for GET /jobs/{job_id}/artifact
///
/// Streams the artifact while the job is completed. A job that has not yet
/// reached `completed` answers 409; expired and unknown jobs answer 404.
async fn job_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response {
    if let Err(response) = require_session(&state, &headers) {
        return response;
    }

    let Some(job) = state.registry.get(&job_id) else {
        return not_found();
    };

    match job.state {
        JobState::Expired => not_found(),
        JobState::Completed => {
            let Some(path) = job.output_path else {
                return not_found();
            };
            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(_) => return not_found(),
            };

            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("artifact")
                .to_string();

            (
                [
                    (
                        header::CONTENT_TYPE,
                        "application/octet-stream".to_string(),
                    ),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                Body::from_stream(ReaderStream::new(file)),
            )
                .into_response()
        }
        _ => (
            StatusCode::CONFLICT,
            Json(json!({"error": "job is not completed"})),
        )
            .into_response(),
    }
}

/// Handler for POST /probe
///
/// Metadata lookup so clients can preview a URL before submitting a job.
async fn probe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ProbeRequest>,
) -> Response {
    if let Err(response) = require_session(&state, &headers) {
        return response;
    }

    match state.engine.probe(&body.source_url).await {
        Ok(info) => Json(info).into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

/// Creates the axum Router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/auth", post(auth))
        .route("/jobs", post(submit_job))
        .route("/jobs/:job_id", get(job_status))
        .route("/jobs/:job_id/artifact", get(job_artifact))
        .route("/probe", post(probe))
        .with_state(state)
}

/// Runs the HTTP server on the given address until the process exits.
pub async fn run_server(state: AppState, bind_addr: &str) -> Result<(), ServerError> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await.map_err(ServerError::BindError)?;
    Ok(())
}
