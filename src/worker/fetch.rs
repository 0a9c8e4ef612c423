//! Fetch worker: probe, validate, cache check, download, resolve, promote

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::extractor::{
    DownloadRequest, ExtractError, FormatOptions, MediaExtractor, MediaInfo, TransferEvent,
};
use crate::observability::Metrics;
use crate::progress::{Phase, ProgressSink};
use crate::storage::{ArtifactStore, StorageError};
use crate::task::FetchTask;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unsupported duration {duration:?}s (ceiling {ceiling:?})")]
    UnsupportedDuration {
        duration: Option<f64>,
        ceiling: Duration,
    },

    #[error("transcoder required for {0} output but none is available")]
    MissingTranscoder(crate::task::MediaFormat),

    #[error("extraction failed: {0}")]
    ExtractionFailure(#[from] ExtractError),

    #[error("output resolution failed: {0}")]
    OutputResolutionFailure(#[source] StorageError),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

/// Per-deployment limits and tool locations
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_duration: Duration,
    /// Share of the progress range attributed to the transfer
    pub download_share: u8,
    /// Resolved transcoder binary, if one was found
    pub transcoder: Option<PathBuf>,
    pub cookies_dir: PathBuf,
}

impl FetchPolicy {
    pub fn from_config(config: &WorkerConfig, transcoder: Option<PathBuf>) -> Self {
        Self {
            max_duration: config.max_duration.as_duration(),
            download_share: config.download_share,
            transcoder,
            cookies_dir: config.cookies_dir.clone(),
        }
    }

    /// Zero (live) and over-ceiling durations are rejected
    fn check_duration(&self, duration: Option<f64>) -> Result<(), FetchError> {
        let ok = duration
            .is_some_and(|secs| secs > 0.0 && secs <= self.max_duration.as_secs_f64());
        if ok {
            Ok(())
        } else {
            Err(FetchError::UnsupportedDuration {
                duration,
                ceiling: self.max_duration,
            })
        }
    }

    fn transfer_percent(&self, downloaded: u64, total: Option<u64>) -> f32 {
        let share = f32::from(self.download_share);
        match total {
            Some(total) if total > 0 => {
                ((downloaded as f64 / total as f64) as f32 * share).min(share)
            }
            _ => 0.0,
        }
    }
}

/// Runs one fetch task end to end
pub struct FetchWorker {
    extractor: Arc<dyn MediaExtractor>,
    artifacts: ArtifactStore,
    progress: Arc<dyn ProgressSink>,
    policy: FetchPolicy,
    metrics: Arc<Metrics>,
}

impl FetchWorker {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        artifacts: ArtifactStore,
        progress: Arc<dyn ProgressSink>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            extractor,
            artifacts,
            progress,
            policy,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn progress(&self) -> &Arc<dyn ProgressSink> {
        &self.progress
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Returns the canonical artifact path, or `None` after recording `(failed, 0)`.
    ///
    /// Never returns an error: failure detail is logged here and clients only
    /// see the failed phase.
    pub async fn run(&self, job_id: &str, task: &FetchTask) -> Option<PathBuf> {
        let result = self.try_run(job_id, task).await;
        self.artifacts.discard_staging(job_id).await;

        match result {
            Ok(path) => Some(path),
            Err(e) => {
                error!(job_id, source = %task.source, error = %e, "Fetch failed");
                self.progress.update(job_id, Phase::Failed, 0.0);
                None
            }
        }
    }

    async fn try_run(&self, job_id: &str, task: &FetchTask) -> Result<PathBuf, FetchError> {
        let cookies = self.resolve_cookies(task.auth_context.as_deref()).await;

        let info = self
            .extractor
            .probe(task.source.as_str(), cookies.as_deref())
            .await?;
        self.policy.check_duration(info.duration)?;

        let key = task.cache_key(&info.title, &source_id(&info, task));
        if self.artifacts.exists(&key).await {
            match self.artifacts.touch(&key).await {
                Ok(path) => {
                    info!(job_id, path = %path.display(), "Artifact already cached");
                    self.metrics.cache_hit();
                    return Ok(path);
                }
                Err(e) if e.is_not_found() => {
                    debug!(job_id, "Cached artifact reclaimed during lookup, fetching again");
                }
                Err(e) => return Err(FetchError::Unexpected(e.to_string())),
            }
        }

        let options = FormatOptions::for_task(task.format, task.quality)?;
        if options.requires_transcoder() && self.policy.transcoder.is_none() {
            return Err(FetchError::MissingTranscoder(task.format));
        }

        self.progress.update(job_id, Phase::Downloading, 0.0);
        let staging = self
            .artifacts
            .create_staging(job_id)
            .await
            .map_err(|e| FetchError::Unexpected(e.to_string()))?;

        let request = DownloadRequest {
            url: task.source.as_str().to_string(),
            staging_dir: staging.clone(),
            stem: key.stem().to_string(),
            options,
            cookies,
            transcoder: self.policy.transcoder.clone(),
        };

        let share = f32::from(self.policy.download_share);
        let on_event = |event: TransferEvent| match event {
            TransferEvent::Progress { downloaded, total } => self.progress.update(
                job_id,
                Phase::Downloading,
                self.policy.transfer_percent(downloaded, total),
            ),
            TransferEvent::Finished => self.progress.update(job_id, Phase::Converting, share),
        };

        info!(job_id, source = %task.source, stem = key.stem(), "Downloading");
        let reported = self.extractor.download(&request, &on_event).await?;
        self.progress.update(job_id, Phase::Converting, share);

        let resolved = self
            .artifacts
            .resolve_output(&staging, &key, reported.as_deref())
            .await
            .map_err(FetchError::OutputResolutionFailure)?;
        let path = self
            .artifacts
            .promote(&resolved, &key)
            .await
            .map_err(|e| FetchError::Unexpected(e.to_string()))?;

        self.progress.update(job_id, Phase::Complete, 100.0);
        info!(job_id, path = %path.display(), "Fetch complete");
        Ok(path)
    }

    /// Cookie bundles that do not exist are ignored
    async fn resolve_cookies(&self, auth_context: Option<&str>) -> Option<PathBuf> {
        let id = auth_context?;
        let path = self.policy.cookies_dir.join(format!("{id}.txt"));
        if is_file(&path).await {
            debug!(path = %path.display(), "Using cookie bundle");
            Some(path)
        } else {
            warn!(auth_context = id, "Cookie bundle not found, continuing without it");
            None
        }
    }
}

/// The probe's id, falling back to the id parsed from the URL
fn source_id(info: &MediaInfo, task: &FetchTask) -> String {
    if info.id.trim().is_empty() {
        task.source.video_id.clone().unwrap_or_default()
    } else {
        info.id.clone()
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
