//! Media extraction seam
//!
//! The fetch worker never talks to the extraction tool directly. It goes
//! through [`MediaExtractor`], which has two modes: `probe` returns metadata
//! without transferring media, `download` transfers and converts into a
//! staging directory while reporting [`TransferEvent`]s.

pub mod options;
pub mod transcoder;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use options::{AudioOptions, FormatOptions, VideoOptions};
pub use ytdlp::YtDlp;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {detail}")]
    ToolFailed {
        tool: String,
        status: String,
        detail: String,
    },

    #[error("unreadable metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    #[error("invalid extraction options: {0}")]
    InvalidOptions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata returned by a probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Seconds; absent or zero for live streams
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Progress reported while a download runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// Bytes received so far for the current stream
    Progress { downloaded: u64, total: Option<u64> },
    /// A stream finished transferring; post-processing may follow
    Finished,
}

/// Everything the extractor needs for one download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Per-job directory; all tool output lands here
    pub staging_dir: PathBuf,
    /// File name stem the tool writes under
    pub stem: String,
    pub options: FormatOptions,
    pub cookies: Option<PathBuf>,
    pub transcoder: Option<PathBuf>,
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Metadata only, no media transfer
    async fn probe(&self, url: &str, cookies: Option<&Path>) -> Result<MediaInfo, ExtractError>;

    /// Downloads into `request.staging_dir`.
    ///
    /// Returns the output path reported by the tool, if it reported one.
    async fn download(
        &self,
        request: &DownloadRequest,
        on_event: &(dyn Fn(TransferEvent) + Send + Sync),
    ) -> Result<Option<PathBuf>, ExtractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_info_from_tool_json() {
        let json = r#"{
            "id": "AAAAAAAAAAA",
            "title": "Test Clip",
            "duration": 120.0,
            "uploader": "someone",
            "thumbnail": "https://i.example/t.jpg",
            "formats": [{"format_id": "251"}]
        }"#;

        let info: MediaInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.id, "AAAAAAAAAAA");
        assert_eq!(info.title, "Test Clip");
        assert_eq!(info.duration, Some(120.0));
    }

    #[test]
    fn test_media_info_live_stream_has_no_duration() {
        let info: MediaInfo =
            serde_json::from_str(r#"{"id": "x", "title": "Live", "duration": null}"#).unwrap();
        assert_eq!(info.duration, None);
        assert_eq!(info.uploader, None);
    }
}
