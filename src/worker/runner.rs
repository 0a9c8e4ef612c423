//! Worker pool: consumes broker channels and records job outcomes

use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::fetch::FetchWorker;
use crate::observability::Metrics;
use crate::progress::Phase;
use crate::queue::{FjallQueue, TaskEnvelope};

/// Spawns one task per receiver. Each worker runs its jobs one at a time.
pub fn spawn_workers(
    receivers: Vec<mpsc::Receiver<TaskEnvelope>>,
    queue: Arc<RwLock<FjallQueue>>,
    fetch: Arc<FetchWorker>,
    metrics: Arc<Metrics>,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(worker_idx, rx)| {
            tokio::spawn(worker_loop(
                worker_idx,
                rx,
                queue.clone(),
                fetch.clone(),
                metrics.clone(),
            ))
        })
        .collect()
}

async fn worker_loop(
    worker_idx: usize,
    mut rx: mpsc::Receiver<TaskEnvelope>,
    queue: Arc<RwLock<FjallQueue>>,
    fetch: Arc<FetchWorker>,
    metrics: Arc<Metrics>,
) {
    info!(worker_idx, "Worker started");
    while let Some(envelope) = rx.recv().await {
        process_envelope(worker_idx, envelope, &queue, &fetch, &metrics).await;
    }
    info!(worker_idx, "Worker channel closed, exiting");
}

async fn process_envelope(
    worker_idx: usize,
    envelope: TaskEnvelope,
    queue: &RwLock<FjallQueue>,
    fetch: &Arc<FetchWorker>,
    metrics: &Metrics,
) {
    let job_id = envelope.job_id;

    // A job id runs at most once; anything not `queued` is skipped
    if let Err(e) = queue.write().await.mark_running(&job_id) {
        warn!(worker_idx, job_id, error = %e, "Skipping job");
        return;
    }
    debug!(worker_idx, job_id, seq = envelope.seq, "Job running");

    let outcome = {
        let fetch = fetch.clone();
        let job_id = job_id.clone();
        let task = envelope.task;
        tokio::spawn(async move { fetch.run(&job_id, &task).await }).await
    };

    let recorded = match outcome {
        Ok(Some(path)) => {
            metrics.job_completed();
            queue.write().await.finish(&job_id, Some(path))
        }
        Ok(None) => {
            metrics.job_failed();
            queue.write().await.finish(&job_id, None)
        }
        Err(join_error) => {
            error!(worker_idx, job_id, error = %join_error, "Fetch task panicked");
            fetch.progress().update(&job_id, Phase::Failed, 0.0);
            fetch.artifacts().discard_staging(&job_id).await;
            metrics.job_failed();
            queue.write().await.fail(&job_id)
        }
    };

    if let Err(e) = recorded {
        error!(worker_idx, job_id, error = %e, "Failed to record job outcome");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{DownloadRequest, ExtractError, MediaExtractor, MediaInfo, TransferEvent};
    use crate::queue::{JobState, TaskBroker};
    use crate::source::{CanonicalUrl, SourceKind};
    use crate::storage::ArtifactStore;
    use crate::task::{FetchTask, MediaFormat, Quality};
    use crate::worker::fetch::FetchPolicy;
    use crate::worker::fetch::tests::{RecordingSink, StubExtractor};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    struct PanickingExtractor;

    #[async_trait]
    impl MediaExtractor for PanickingExtractor {
        async fn probe(&self, _url: &str, _cookies: Option<&Path>) -> Result<MediaInfo, ExtractError> {
            panic!("extractor exploded");
        }

        async fn download(
            &self,
            _request: &DownloadRequest,
            _on_event: &(dyn Fn(TransferEvent) + Send + Sync),
        ) -> Result<Option<PathBuf>, ExtractError> {
            unreachable!()
        }
    }

    /// Leaves a partial file in staging, then panics mid-transfer
    struct PanicMidTransfer;

    #[async_trait]
    impl MediaExtractor for PanicMidTransfer {
        async fn probe(&self, url: &str, cookies: Option<&Path>) -> Result<MediaInfo, ExtractError> {
            StubExtractor::new(Some(120.0)).probe(url, cookies).await
        }

        async fn download(
            &self,
            request: &DownloadRequest,
            _on_event: &(dyn Fn(TransferEvent) + Send + Sync),
        ) -> Result<Option<PathBuf>, ExtractError> {
            let partial = request.staging_dir.join(format!("{}.webm.part", request.stem));
            tokio::fs::write(&partial, b"half").await?;
            panic!("connection reset mid-transfer");
        }
    }

    fn task() -> FetchTask {
        FetchTask {
            source: CanonicalUrl {
                kind: SourceKind::Primary,
                url: "https://www.youtube.com/watch?v=AAAAAAAAAAA".to_string(),
                video_id: Some("AAAAAAAAAAA".to_string()),
            },
            format: MediaFormat::Audio,
            quality: Quality::Bitrate(192),
            auth_context: None,
        }
    }

    async fn wait_terminal(broker: &TaskBroker, job_id: &str) -> JobState {
        for _ in 0..200 {
            if let Some(state) = broker.state(job_id).await.unwrap() {
                if state.is_terminal() {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not finish");
    }

    async fn pool(
        extractor: Arc<dyn MediaExtractor>,
        temp: &TempDir,
    ) -> (TaskBroker, Arc<RecordingSink>, Arc<Metrics>) {
        let queue = Arc::new(RwLock::new(
            FjallQueue::open(temp.path().join("queue")).unwrap(),
        ));
        let artifacts = ArtifactStore::new(temp.path().join("uploads"));
        artifacts.ensure().await.unwrap();
        let sink = Arc::new(RecordingSink::default());
        let metrics = Arc::new(Metrics::new());

        let fetch = Arc::new(FetchWorker::new(
            extractor,
            artifacts,
            sink.clone(),
            FetchPolicy {
                max_duration: Duration::from_secs(7200),
                download_share: 50,
                transcoder: Some(PathBuf::from("/usr/bin/ffmpeg")),
                cookies_dir: temp.path().join("cookies"),
            },
        ));

        let (broker, receivers) = TaskBroker::new(queue.clone(), 2, 10);
        spawn_workers(receivers, queue, fetch, metrics.clone());
        (broker, sink, metrics)
    }

    #[tokio::test]
    async fn test_job_finishes_with_result() {
        let temp = TempDir::new().unwrap();
        let (broker, _sink, metrics) =
            pool(Arc::new(StubExtractor::new(Some(120.0))), &temp).await;

        let job_id = broker.submit(task()).await.unwrap();
        match wait_terminal(&broker, &job_id).await {
            JobState::Finished { result: Some(path) } => {
                assert!(path.ends_with("Test_Clip-AAAAAAAAAAA-192.mp3"));
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(metrics.snapshot().jobs_completed, 1);
    }

    #[tokio::test]
    async fn test_worker_failure_finishes_with_null_result() {
        let temp = TempDir::new().unwrap();
        let (broker, _sink, metrics) =
            pool(Arc::new(StubExtractor::new(Some(0.0))), &temp).await;

        let job_id = broker.submit(task()).await.unwrap();
        assert_eq!(
            wait_terminal(&broker, &job_id).await,
            JobState::Finished { result: None }
        );
        assert_eq!(metrics.snapshot().jobs_failed, 1);
    }

    #[tokio::test]
    async fn test_panic_marks_job_failed_and_pool_survives() {
        let temp = TempDir::new().unwrap();
        let (broker, sink, _metrics) = pool(Arc::new(PanickingExtractor), &temp).await;

        let first = broker.submit(task()).await.unwrap();
        let second = broker.submit(task()).await.unwrap();
        let third = broker.submit(task()).await.unwrap();

        for job_id in [&first, &second, &third] {
            assert_eq!(wait_terminal(&broker, job_id).await, JobState::Failed);
        }
        assert!(broker.health_check());
        assert!(
            sink.events
                .lock()
                .unwrap()
                .iter()
                .all(|event| *event == (Phase::Failed, 0.0))
        );
    }

    #[tokio::test]
    async fn test_panic_discards_staging_directory() {
        let temp = TempDir::new().unwrap();
        let (broker, _sink, _metrics) = pool(Arc::new(PanicMidTransfer), &temp).await;

        let job_id = broker.submit(task()).await.unwrap();
        assert_eq!(wait_terminal(&broker, &job_id).await, JobState::Failed);

        let staging = temp.path().join("uploads").join(".staging").join(&job_id);
        assert!(!staging.exists());
    }
}
