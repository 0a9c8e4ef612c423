use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use http_body_util::BodyExt;
use std::collections::HashMap;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    error::ApiError,
    models::{
        HealthResponse, JobStatus, PollQuery, PollResponse, Session, SubmitRequest,
        SubmitResponse,
    },
    state::AppState,
    utils,
};
use crate::progress::{Phase, ProgressEntry};
use crate::queue::JobState;
use crate::storage::{self, StorageError};
use crate::task::{FetchTask, MediaFormat, Quality};

fn internal(context: &str, e: impl std::fmt::Display) -> ApiError {
    ApiError::Internal(format!("{context}: {e}"))
}

/// Job submission endpoint (POST /jobs)
///
/// ## Flow:
/// 1. Validate Content-Type, read the body within the payload limit
/// 2. Canonicalize the URL; reject unsupported sources before anything is queued
/// 3. Build the immutable task descriptor (format, quality, auth context)
/// 4. Persist and dispatch through the broker, which assigns the job id
/// 5. Open a download session bound to the job
/// 6. Return 202 Accepted with job id, session token and canonical URL
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    utils::parse_content_type(content_type)?;

    let max_size = usize::try_from(state.config.server.max_payload_bytes.as_u64())
        .unwrap_or(usize::MAX);
    let body_bytes = read_body(body, max_size).await?;
    let request: SubmitRequest = serde_json::from_slice(&body_bytes)?;

    let source = state.canonicalizer.canonicalize(&request.url)?;
    let format: MediaFormat = request.format.parse()?;
    let quality = match request.quality.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => Quality::parse(format, token)?,
        _ => format.default_quality(),
    };
    let task = FetchTask::new(source, format, quality, request.auth_context)?;
    let canonical_url = task.source.url.clone();

    let job_id = state
        .broker
        .submit(task)
        .await
        .map_err(|e| internal("failed to enqueue job", e))?;

    let now = Utc::now();
    let ttl = chrono::Duration::from_std(state.config.retention.session_ttl.as_duration())
        .unwrap_or_else(|_| chrono::Duration::hours(1));
    let session = Session {
        token: Uuid::new_v4().to_string(),
        job_id: job_id.clone(),
        created_at: now,
        expires_at: now + ttl,
        artifact: None,
    };
    state
        .ledger
        .put_session(&session)
        .map_err(|e| internal("failed to store session", e))?;

    state.metrics.job_submitted();
    info!(job_id, canonical_url, %format, %quality, "Job accepted");

    let response = SubmitResponse {
        job_id,
        session: session.token,
        canonical_url,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Reads the request body and enforces the size limit.
///
/// Decompression is handled by `RequestDecompressionLayer`.
async fn read_body(body: Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::InvalidPayload(err.to_string()))?
        .to_bytes()
        .to_vec();

    utils::validate_body_size(&data, max_size)?;
    Ok(data)
}

/// Job status endpoint (GET /jobs/{job_id}?session=<token>)
///
/// One queue read plus one progress read. A completed job's artifact is
/// bound into the caller's session for a later one-shot retrieval.
pub async fn poll_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
    let record = state
        .broker
        .record(&job_id)
        .await
        .map_err(|e| internal("failed to read job", e))?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    let progress = state
        .progress
        .get(&job_id)
        .map_err(|e| internal("failed to read progress", e))?;

    let mut artifact = match &record.state {
        JobState::Finished { result: Some(path) } => Some(path.clone()),
        _ => None,
    };
    if let Some(path) = &artifact {
        if !is_file(path).await {
            debug!(job_id, path = %path.display(), "Result no longer on disk");
            artifact = None;
        }
    }

    let response = match (artifact, record.state) {
        (Some(path), _) => {
            if let Some(token) = query.session.as_deref() {
                bind_artifact(&state, token, &job_id, &path)?;
            }
            if progress.is_some() {
                if let Err(e) = state.progress.remove(&job_id) {
                    debug!(job_id, error = %e, "Failed to drop progress entry");
                }
            }
            PollResponse {
                status: JobStatus::Complete,
                phase: Phase::Complete,
                percent: 100.0,
            }
        }
        (None, JobState::Finished { .. } | JobState::Failed) => {
            let (phase, percent) = progress
                .map(|entry| (entry.phase, entry.percent))
                .unwrap_or((Phase::Failed, 0.0));
            PollResponse {
                status: JobStatus::Failed,
                phase,
                percent,
            }
        }
        (None, JobState::Queued | JobState::Running) => {
            let entry = progress.unwrap_or_else(ProgressEntry::pending);
            PollResponse {
                status: JobStatus::InProgress,
                phase: entry.phase,
                percent: entry.percent,
            }
        }
    };

    Ok(Json(response))
}

/// Sessions that are missing, expired or belong to another job are left untouched
fn bind_artifact(
    state: &AppState,
    token: &str,
    job_id: &str,
    path: &std::path::Path,
) -> Result<(), ApiError> {
    let session = state
        .ledger
        .get_session(token, Utc::now())
        .map_err(|e| internal("failed to read session", e))?;

    match session {
        Some(mut session) if session.job_id == job_id => {
            if session.artifact.as_deref() != Some(path) {
                session.artifact = Some(path.to_path_buf());
                state
                    .ledger
                    .put_session(&session)
                    .map_err(|e| internal("failed to store session", e))?;
                debug!(job_id, path = %path.display(), "Artifact bound to session");
            }
        }
        Some(_) => warn!(job_id, "Session belongs to another job, not binding"),
        None => debug!(job_id, "No live session to bind"),
    }
    Ok(())
}

/// One-shot artifact retrieval (GET /sessions/{token}/file)
///
/// Streams the artifact bound to the session and consumes the session.
/// Nothing bound, an expired session or a reclaimed file are all 404.
pub async fn retrieve_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let session = state
        .ledger
        .get_session(&token, Utc::now())
        .map_err(|e| internal("failed to read session", e))?
        .ok_or_else(|| ApiError::NotFound("session".to_string()))?;

    let path = session
        .artifact
        .ok_or_else(|| ApiError::NotFound("no artifact ready for this session".to_string()))?;

    let (file, len) = match state.artifacts.open(&path).await {
        Ok(opened) => opened,
        Err(e) if e.is_not_found() => {
            warn!(job_id = %session.job_id, path = %path.display(), "Artifact reclaimed before retrieval");
            return Err(ApiError::NotFound("artifact".to_string()));
        }
        Err(e @ StorageError::OutsideRoot(_)) => {
            warn!(job_id = %session.job_id, error = %e, "Refusing to serve artifact");
            return Err(ApiError::NotFound("artifact".to_string()));
        }
        Err(e) => return Err(internal("failed to open artifact", e)),
    };

    state
        .ledger
        .remove_session(&token)
        .map_err(|e| internal("failed to consume session", e))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download.bin".to_string());
    info!(job_id = %session.job_id, filename, bytes = len, "Serving artifact");
    state.metrics.artifact_served();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(storage::content_type(&path).as_ref())
            .map_err(|e| internal("invalid content type", e))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&utils::content_disposition(&filename))
            .map_err(|e| internal("invalid file name", e))?,
    );

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

async fn is_file(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Health check endpoint (GET /health)
///
/// Returns 503 Service Unavailable if any component is unhealthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    let status = |ok: bool| if ok { "healthy" } else { "unhealthy" }.to_string();

    components.insert("api".to_string(), status(true));
    components.insert("ledger".to_string(), status(state.ledger.health_check().is_ok()));
    components.insert("queue".to_string(), status(state.broker.queue_health().await.is_ok()));
    components.insert("workers".to_string(), status(state.broker.health_check()));
    components.insert(
        "storage".to_string(),
        status(is_dir(state.artifacts.root()).await),
    );

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: status(all_healthy),
        components,
        workers: state.broker.num_workers(),
        metrics: state.metrics.snapshot(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

async fn is_dir(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
