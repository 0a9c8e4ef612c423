//! Per-job progress reporting
//!
//! A job moves `downloading -> converting -> complete`, or jumps to `failed`
//! from any point. The tracker enforces that ordering on write: updates that
//! would move a job backwards in phase or percent are dropped, and terminal
//! entries are frozen. Pollers therefore always observe a non-decreasing
//! sequence even when the extraction tool restarts its byte counters for a
//! second stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ledger::{FjallStore, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Downloading,
    Converting,
    Complete,
    Failed,
}

impl Phase {
    fn rank(&self) -> u8 {
        match self {
            Phase::Downloading => 0,
            Phase::Converting => 1,
            Phase::Complete => 2,
            Phase::Failed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Downloading => "downloading",
            Phase::Converting => "converting",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub phase: Phase,
    pub percent: f32,
    pub updated_at: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn new(phase: Phase, percent: f32) -> Self {
        Self {
            phase,
            percent: clamp_percent(percent),
            updated_at: Utc::now(),
        }
    }

    /// Entry reported before the worker has written anything
    pub fn pending() -> Self {
        Self::new(Phase::Downloading, 0.0)
    }

    /// Applies an update, returning the entry to store or `None` if it must be dropped
    fn advance(current: Option<&ProgressEntry>, phase: Phase, percent: f32) -> Option<Self> {
        let percent = clamp_percent(percent);
        let Some(current) = current else {
            return Some(Self::new(phase, percent));
        };

        if current.phase.is_terminal() {
            return None;
        }
        if phase == Phase::Failed {
            return Some(Self::new(phase, percent));
        }
        if phase.rank() < current.phase.rank() {
            return None;
        }

        let percent = percent.max(current.percent);
        if phase == current.phase && percent <= current.percent {
            return None;
        }
        Some(Self::new(phase, percent))
    }
}

fn clamp_percent(percent: f32) -> f32 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

/// Write side of progress reporting, as seen by a fetch worker
pub trait ProgressSink: Send + Sync {
    /// Best-effort update; storage failures are logged, never surfaced to the job
    fn update(&self, job_id: &str, phase: Phase, percent: f32);
}

/// Progress table backed by the ledger's `progress` partition
#[derive(Clone)]
pub struct ProgressTracker {
    ledger: Arc<FjallStore>,
}

impl ProgressTracker {
    pub fn new(ledger: Arc<FjallStore>) -> Self {
        Self { ledger }
    }

    pub fn get(&self, job_id: &str) -> Result<Option<ProgressEntry>> {
        self.ledger.get_progress(job_id)
    }

    /// Records an update if it moves the job forward. Returns whether it was stored.
    pub fn set(&self, job_id: &str, phase: Phase, percent: f32) -> Result<bool> {
        let current = self.ledger.get_progress(job_id)?;
        match ProgressEntry::advance(current.as_ref(), phase, percent) {
            Some(entry) => {
                self.ledger.put_progress(job_id, &entry)?;
                debug!(job_id, %phase, percent = entry.percent, "Progress updated");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove(&self, job_id: &str) -> Result<()> {
        self.ledger.remove_progress(job_id)
    }
}

impl ProgressSink for ProgressTracker {
    fn update(&self, job_id: &str, phase: Phase, percent: f32) {
        if let Err(e) = self.set(job_id, phase, percent) {
            warn!(job_id, %phase, error = %e, "Failed to record progress");
        }
    }
}
