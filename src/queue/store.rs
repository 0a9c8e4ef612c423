use crate::task::FetchTask;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: &'static str,
        to: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Lifecycle of a submitted job. `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    /// `result` is `None` when the job ran but produced nothing usable
    Finished { result: Option<PathBuf> },
    Failed,
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Finished { .. } => "finished",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished { .. } | JobState::Failed)
    }

    fn can_become(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Queued, JobState::Failed)
                | (JobState::Running, JobState::Finished { .. })
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persistent record of one submitted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub seq: u64,
    pub task: FetchTask,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// FjallQueue persists submitted jobs and their state using Fjall
///
/// Architecture:
/// - `tasks` partition: u64 (big-endian) → job_id, giving submission order
/// - `jobs` partition: job_id → JobRecord (JSON)
/// - `metadata` partition: "next_seq" → u64 (atomic counter)
///
/// Records are persisted before being sent to workers, so jobs accepted
/// before a crash can be recovered on the next start.
pub struct FjallQueue {
    keyspace: Keyspace,
    tasks: PartitionHandle,
    jobs: PartitionHandle,
    metadata: PartitionHandle,
    seq_counter: Arc<AtomicU64>,
}

impl FjallQueue {
    /// Open or create a new FjallQueue at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening FjallQueue at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let tasks = keyspace.open_partition("tasks", PartitionCreateOptions::default())?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let current_seq = metadata
            .get(b"next_seq")?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(0);

        info!("FjallQueue opened, current sequence: {}", current_seq);

        Ok(Self {
            keyspace,
            tasks,
            jobs,
            metadata,
            seq_counter: Arc::new(AtomicU64::new(current_seq)),
        })
    }

    /// Persist a new job in the `queued` state and return its sequence number
    pub fn enqueue(&self, job_id: &str, task: &FetchTask) -> Result<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();

        let record = JobRecord {
            job_id: job_id.to_string(),
            seq,
            task: task.clone(),
            state: JobState::Queued,
            created_at: now,
            updated_at: now,
        };

        self.jobs.insert(job_id, serde_json::to_vec(&record)?)?;
        self.tasks.insert(seq.to_be_bytes(), job_id)?;

        // Persist updated counter (for crash recovery)
        self.metadata.insert(b"next_seq", (seq + 1).to_be_bytes())?;

        debug!(seq, job_id, "Job enqueued");

        Ok(seq)
    }

    pub fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        match self.jobs.get(job_id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn state(&self, job_id: &str) -> Result<Option<JobState>> {
        Ok(self.get(job_id)?.map(|record| record.state))
    }

    /// Move a job to a new state. Terminal states are never left.
    pub fn transition(&self, job_id: &str, next: JobState) -> Result<JobRecord> {
        let mut record = self
            .get(job_id)?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        if !record.state.can_become(&next) {
            return Err(QueueError::InvalidTransition {
                job_id: job_id.to_string(),
                from: record.state.name(),
                to: next.name(),
            });
        }

        debug!(job_id, from = %record.state, to = %next, "Job state transition");
        record.state = next;
        record.updated_at = Utc::now();
        self.jobs.insert(job_id, serde_json::to_vec(&record)?)?;

        Ok(record)
    }

    pub fn mark_running(&self, job_id: &str) -> Result<JobRecord> {
        self.transition(job_id, JobState::Running)
    }

    pub fn finish(&self, job_id: &str, result: Option<PathBuf>) -> Result<JobRecord> {
        self.transition(job_id, JobState::Finished { result })
    }

    pub fn fail(&self, job_id: &str) -> Result<JobRecord> {
        self.transition(job_id, JobState::Failed)
    }

    /// Non-terminal jobs in submission order
    pub fn unfinished(&self) -> Result<Vec<JobRecord>> {
        let mut records = Vec::new();

        for item in self.tasks.iter() {
            let (_, job_id) = item?;
            let job_id = String::from_utf8_lossy(&job_id).to_string();
            if let Some(record) = self.get(&job_id)? {
                if !record.state.is_terminal() {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// Removes terminal jobs last updated before `cutoff`, with their order index entries
    ///
    /// Index entries pointing at records that no longer decode are dropped too.
    pub fn prune_terminal(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut expired = Vec::new();

        for item in self.tasks.iter() {
            let (seq_key, job_id) = item?;
            let job_id = String::from_utf8_lossy(&job_id).to_string();
            let stale = match self.get(&job_id) {
                Ok(Some(record)) => record.state.is_terminal() && record.updated_at < cutoff,
                Ok(None) | Err(QueueError::Serialization(_)) => true,
                Err(e) => return Err(e),
            };
            if stale {
                expired.push((seq_key, job_id));
            }
        }

        for (seq_key, job_id) in &expired {
            debug!(job_id, "Pruning terminal job");
            self.jobs.remove(job_id.as_str())?;
            self.tasks.remove(seq_key.clone())?;
        }

        if !expired.is_empty() {
            info!(pruned = expired.len(), "Pruned terminal jobs");
        }
        Ok(expired.len())
    }

    /// Get current sequence counter value
    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Health check - verify database is accessible
    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(b"next_seq")?;
        Ok(())
    }
}
