use crate::queue::store::{FjallQueue, JobRecord, JobState, QueueError};
use crate::task::FetchTask;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// TaskEnvelope carries one job from the broker to a worker
#[derive(Clone, Debug)]
pub struct TaskEnvelope {
    pub seq: u64,
    pub job_id: String,
    pub task: FetchTask,
}

/// Jobs found unfinished when the broker starts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    pub redispatched: usize,
    pub abandoned: usize,
}

/// TaskBroker is the job queue adapter seen by the HTTP surface
///
/// 1. `submit(task)` persists a `queued` record in FjallQueue and gets a seq
/// 2. The envelope goes round-robin to a worker over a bounded mpsc channel
/// 3. Workers move the record through `running` to a terminal state
///
/// The broker owns no retry logic. A full channel applies backpressure to
/// submitters; a closed channel leaves the job persisted as `queued` for
/// [`TaskBroker::recover`] on the next start.
pub struct TaskBroker {
    queue: Arc<RwLock<FjallQueue>>,
    worker_channels: Vec<mpsc::Sender<TaskEnvelope>>,
    next_worker: AtomicUsize,
}

impl TaskBroker {
    /// Create a new TaskBroker with worker channels
    ///
    /// Returns the broker and one receiver per worker.
    pub fn new(
        queue: Arc<RwLock<FjallQueue>>,
        num_workers: usize,
        channel_size: usize,
    ) -> (Self, Vec<mpsc::Receiver<TaskEnvelope>>) {
        info!(
            num_workers,
            channel_size, "Creating TaskBroker with worker channels"
        );

        let (worker_channels, worker_receivers) = (0..num_workers.max(1))
            .map(|_| mpsc::channel(channel_size.max(1)))
            .unzip();

        let broker = Self {
            queue,
            worker_channels,
            next_worker: AtomicUsize::new(0),
        };

        (broker, worker_receivers)
    }

    /// Submit a task and return its opaque job id
    pub async fn submit(&self, task: FetchTask) -> Result<String, QueueError> {
        let job_id = Uuid::now_v7().to_string();

        let seq = {
            let queue = self.queue.write().await;
            queue.enqueue(&job_id, &task)?
        };

        debug!(seq, job_id, source = %task.source, "Job persisted to queue");

        self.dispatch(TaskEnvelope {
            seq,
            job_id: job_id.clone(),
            task,
        })
        .await;

        Ok(job_id)
    }

    async fn dispatch(&self, envelope: TaskEnvelope) {
        let worker_idx =
            self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();
        let seq = envelope.seq;

        match self.worker_channels[worker_idx].send(envelope).await {
            Ok(_) => debug!(seq, worker_idx, "Job sent to worker"),
            Err(_) => warn!(seq, worker_idx, "Worker channel closed, job left queued"),
        }
    }

    pub async fn state(&self, job_id: &str) -> Result<Option<JobState>, QueueError> {
        self.queue.read().await.state(job_id)
    }

    pub async fn record(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        self.queue.read().await.get(job_id)
    }

    /// Re-dispatch jobs persisted as `queued`; fail jobs a previous process left `running`
    pub async fn recover(&self) -> Result<RecoveryStats, QueueError> {
        let mut stats = RecoveryStats::default();
        let mut pending = Vec::new();

        {
            let queue = self.queue.write().await;
            for record in queue.unfinished()? {
                match record.state {
                    JobState::Running => {
                        warn!(job_id = %record.job_id, "Job interrupted by restart, marking failed");
                        queue.fail(&record.job_id)?;
                        stats.abandoned += 1;
                    }
                    _ => pending.push(TaskEnvelope {
                        seq: record.seq,
                        job_id: record.job_id,
                        task: record.task,
                    }),
                }
            }
        }

        stats.redispatched = pending.len();
        for envelope in pending {
            self.dispatch(envelope).await;
        }

        if stats != RecoveryStats::default() {
            info!(
                redispatched = stats.redispatched,
                abandoned = stats.abandoned,
                "Recovered unfinished jobs"
            );
        }
        Ok(stats)
    }

    /// Get number of active workers
    pub fn num_workers(&self) -> usize {
        self.worker_channels.len()
    }

    pub async fn queue_health(&self) -> Result<(), QueueError> {
        self.queue.read().await.health_check()
    }

    /// Check if all worker channels are healthy (not closed)
    pub fn health_check(&self) -> bool {
        self.worker_channels.iter().all(|ch| !ch.is_closed())
    }
}
