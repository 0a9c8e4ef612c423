//! API models for the submit, poll and retrieve endpoints.
//!
//! - `POST /jobs` accepts a [`SubmitRequest`] and answers [`SubmitResponse`]
//! - `GET /jobs/{job_id}` answers [`PollResponse`]
//! - `GET /sessions/{token}/file` streams the artifact bound to a [`Session`]
//!
//! A submission example (as JSON):
//!
//! ```json
//! {
//!   "url": "https://youtu.be/AAAAAAAAAAA?list=RDxyz",
//!   "format": "audio",
//!   "quality": "192",
//!   "auth_context": "member-cookies"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::observability::MetricsSnapshot;
use crate::progress::Phase;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitRequest {
    pub url: String,
    pub format: String,
    /// Bitrate ("192") or resolution token ("720p"); the format's default when absent
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub auth_context: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    /// Token scoping the one-shot retrieval of this job's artifact
    pub session: String,
    pub canonical_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollQuery {
    pub session: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub status: JobStatus,
    pub phase: Phase,
    pub percent: f32,
}

/// Session token → job binding; `artifact` is set once a poll observes completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub workers: usize,
    pub metrics: MetricsSnapshot,
    pub version: String,
}
