//! Retention sweeper: reclaims artifacts and stale staging directories

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{STAGING_DIR, StorageError};
use crate::config::RetentionConfig;
use crate::ledger::FjallStore;
use crate::observability::Metrics;
use crate::queue::FjallQueue;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub removed: usize,
    pub kept: usize,
    pub staging_removed: usize,
    pub errors: usize,
}

/// Deletes artifacts directly under `root` whose mtime is older than `max_age`.
///
/// Only regular files at the top level are artifacts. Job staging directories
/// under `.staging` are removed once they are older than `max_age` as a whole.
/// Per-entry failures are logged and counted; they never abort the sweep.
pub async fn sweep_once(
    root: &Path,
    max_age: Duration,
    now: SystemTime,
) -> Result<SweepStats, StorageError> {
    let mut stats = SweepStats::default();

    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => {
            return Err(StorageError::Io {
                path: root.to_path_buf(),
                source: e,
            });
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(path = %root.display(), error = %e, "Failed to read directory entry");
                stats.errors += 1;
                break;
            }
        };
        let path = entry.path();

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to stat entry");
                stats.errors += 1;
                continue;
            }
        };

        if metadata.is_dir() {
            if entry.file_name() == STAGING_DIR {
                sweep_staging(&path, max_age, now, &mut stats).await;
            }
            continue;
        }
        if !metadata.is_file() {
            continue;
        }

        if !is_expired(&metadata, max_age, now) {
            stats.kept += 1;
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed expired artifact");
                stats.removed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove artifact");
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

async fn sweep_staging(staging: &Path, max_age: Duration, now: SystemTime, stats: &mut SweepStats) {
    let mut entries = match fs::read_dir(staging).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %staging.display(), error = %e, "Failed to read staging directory");
            stats.errors += 1;
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let expired = match entry.metadata().await {
            Ok(m) => m.is_dir() && is_expired(&m, max_age, now),
            Err(_) => false,
        };
        if !expired {
            continue;
        }

        match fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed abandoned staging directory");
                stats.staging_removed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove staging directory");
                stats.errors += 1;
            }
        }
    }
}

/// Entries with an unreadable or future mtime are never expired
fn is_expired(metadata: &std::fs::Metadata, max_age: Duration, now: SystemTime) -> bool {
    metadata
        .modified()
        .ok()
        .and_then(|mtime| now.duration_since(mtime).ok())
        .is_some_and(|age| age > max_age)
}

/// Periodic sweep over the artifact directory, the ledger and finished jobs
pub struct RetentionSweeper {
    root: std::path::PathBuf,
    ledger: Arc<FjallStore>,
    queue: Option<Arc<RwLock<FjallQueue>>>,
    retention: RetentionConfig,
    metrics: Arc<Metrics>,
}

impl RetentionSweeper {
    pub fn new(
        root: impl Into<std::path::PathBuf>,
        ledger: Arc<FjallStore>,
        retention: RetentionConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            root: root.into(),
            ledger,
            queue: None,
            retention,
            metrics,
        }
    }

    /// Also prune terminal job records older than the artifact window
    pub fn with_queue(mut self, queue: Arc<RwLock<FjallQueue>>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// One pass: artifacts, staging directories, ledger entries, then job records
    pub async fn run_once(&self) -> SweepStats {
        let max_age = self.retention.artifact_ttl.as_duration();

        let stats = match sweep_once(&self.root, max_age, SystemTime::now()).await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Artifact sweep failed");
                SweepStats::default()
            }
        };

        if stats.removed > 0 || stats.staging_removed > 0 || stats.errors > 0 {
            info!(
                removed = stats.removed,
                staging_removed = stats.staging_removed,
                kept = stats.kept,
                errors = stats.errors,
                "Retention sweep finished"
            );
        }
        self.metrics.artifacts_swept(stats.removed as u64);

        let now = Utc::now();
        let progress_cutoff = chrono::Duration::from_std(max_age)
            .map(|age| now - age)
            .unwrap_or(now);
        if let Err(e) = self.ledger.prune_expired(progress_cutoff, now) {
            warn!(error = %e, "Ledger pruning failed");
        }
        if let Some(queue) = &self.queue {
            if let Err(e) = queue.read().await.prune_terminal(progress_cutoff) {
                warn!(error = %e, "Job record pruning failed");
            }
        }

        stats
    }

    /// Runs [`Self::run_once`] on a fixed interval until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        let period = self.retention.sweep_interval.as_duration();
        info!(
            interval = %self.retention.sweep_interval,
            ttl = %self.retention.artifact_ttl,
            root = %self.root.display(),
            "Starting retention sweeper"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_young_artifacts_are_kept() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("fresh.mp3"), b"x").await.unwrap();

        let stats = sweep_once(temp_dir.path(), 12 * HOUR, SystemTime::now())
            .await
            .unwrap();
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.kept, 1);
        assert!(temp_dir.path().join("fresh.mp3").exists());
    }

    #[tokio::test]
    async fn test_expired_artifacts_are_removed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("old.mp3"), b"x").await.unwrap();

        // Sweeping "13 hours from now" ages the file past the window
        let later = SystemTime::now() + 13 * HOUR;
        let stats = sweep_once(temp_dir.path(), 12 * HOUR, later).await.unwrap();
        assert_eq!(stats.removed, 1);
        assert!(!temp_dir.path().join("old.mp3").exists());
    }

    #[tokio::test]
    async fn test_staging_directories() {
        let temp_dir = TempDir::new().unwrap();
        let job_dir = temp_dir.path().join(STAGING_DIR).join("job-1");
        fs::create_dir_all(&job_dir).await.unwrap();
        fs::write(job_dir.join("partial.webm.part"), b"x").await.unwrap();

        let stats = sweep_once(temp_dir.path(), 12 * HOUR, SystemTime::now())
            .await
            .unwrap();
        assert_eq!(stats.staging_removed, 0);
        assert!(job_dir.exists());

        let later = SystemTime::now() + 13 * HOUR;
        let stats = sweep_once(temp_dir.path(), 12 * HOUR, later).await.unwrap();
        assert_eq!(stats.staging_removed, 1);
        assert_eq!(stats.removed, 0);
        assert!(!job_dir.exists());
        assert!(temp_dir.path().join(STAGING_DIR).exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_empty_sweep() {
        let temp_dir = TempDir::new().unwrap();
        let stats = sweep_once(&temp_dir.path().join("nope"), HOUR, SystemTime::now())
            .await
            .unwrap();
        assert_eq!(stats, SweepStats::default());
    }

    #[tokio::test]
    async fn test_sweeper_prunes_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Arc::new(FjallStore::open(temp_dir.path().join("ledger")).unwrap());
        let uploads = temp_dir.path().join("uploads");
        fs::create_dir_all(&uploads).await.unwrap();
        fs::write(uploads.join("fresh.mp3"), b"x").await.unwrap();

        let sweeper = RetentionSweeper::new(
            &uploads,
            ledger.clone(),
            RetentionConfig::default(),
            Arc::new(Metrics::new()),
        );
        let stats = sweeper.run_once().await;
        assert_eq!(stats.kept, 1);
        assert!(ledger.last_prune().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweeper_prunes_old_terminal_jobs() {
        use crate::queue::JobState;
        use crate::source::{CanonicalUrl, SourceKind};
        use crate::task::{FetchTask, MediaFormat, Quality};

        let temp_dir = TempDir::new().unwrap();
        let ledger = Arc::new(FjallStore::open(temp_dir.path().join("ledger")).unwrap());
        let queue = Arc::new(RwLock::new(
            FjallQueue::open(temp_dir.path().join("queue")).unwrap(),
        ));
        let task = FetchTask {
            source: CanonicalUrl {
                kind: SourceKind::Primary,
                url: "https://www.youtube.com/watch?v=AAAAAAAAAAA".to_string(),
                video_id: Some("AAAAAAAAAAA".to_string()),
            },
            format: MediaFormat::Audio,
            quality: Quality::Bitrate(192),
            auth_context: None,
        };
        {
            let q = queue.write().await;
            q.enqueue("done", &task).unwrap();
            q.mark_running("done").unwrap();
            q.finish("done", None).unwrap();
            q.enqueue("waiting", &task).unwrap();
        }

        let retention = RetentionConfig {
            artifact_ttl: crate::humanize::HumanDuration::from_secs(0),
            ..RetentionConfig::default()
        };
        let sweeper = RetentionSweeper::new(
            temp_dir.path().join("uploads"),
            ledger,
            retention,
            Arc::new(Metrics::new()),
        )
        .with_queue(queue.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        sweeper.run_once().await;

        let q = queue.read().await;
        assert!(q.get("done").unwrap().is_none());
        assert_eq!(q.state("waiting").unwrap(), Some(JobState::Queued));
    }
}
