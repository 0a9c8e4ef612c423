use axum::{Router, routing::get, routing::post};
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

use super::{
    services::{health, poll_job, retrieve_file, submit_job},
    state::AppState,
};

/// Routes of the status/result surface
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/{job_id}", get(poll_job))
        .route("/sessions/{token}/file", get(retrieve_file))
        .route("/health", get(health))
        .with_state(state)
        // Automatically decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
