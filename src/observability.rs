//! In-process counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle shared by the API, the workers and the sweeper
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_submitted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    cache_hits: AtomicU64,
    artifacts_served: AtomicU64,
    artifacts_swept: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_submitted", "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_completed", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cache_hits", "Metric incremented");
    }

    pub fn artifact_served(&self) {
        self.artifacts_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn artifacts_swept(&self, count: u64) {
        if count > 0 {
            self.artifacts_swept.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            artifacts_served: self.artifacts_served.load(Ordering::Relaxed),
            artifacts_swept: self.artifacts_swept.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub cache_hits: u64,
    pub artifacts_served: u64,
    pub artifacts_swept: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.job_submitted();
        metrics.job_submitted();
        metrics.cache_hit();
        metrics.artifacts_swept(0);
        metrics.artifacts_swept(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.artifacts_swept, 3);
        assert_eq!(snapshot.jobs_failed, 0);
    }
}
