use std::path::Path;

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use crate::api::models::Session;
use crate::progress::ProgressEntry;

use super::error::Result;
use super::partitions::{encode_progress_key, encode_session_key};
use super::pruning::{self, PruneStats};

/// Fjall-backed persistent storage for progress entries and download sessions
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    progress: PartitionHandle,
    sessions: PartitionHandle,
    metadata: PartitionHandle,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let progress = keyspace.open_partition("progress", PartitionCreateOptions::default())?;
        let sessions = keyspace.open_partition("sessions", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self {
            keyspace,
            progress,
            sessions,
            metadata,
        })
    }

    pub fn put_progress(&self, job_id: &str, entry: &ProgressEntry) -> Result<()> {
        let value = serde_json::to_vec(entry)?;
        self.progress.insert(encode_progress_key(job_id), value)?;
        Ok(())
    }

    pub fn get_progress(&self, job_id: &str) -> Result<Option<ProgressEntry>> {
        match self.progress.get(encode_progress_key(job_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn remove_progress(&self, job_id: &str) -> Result<()> {
        self.progress.remove(encode_progress_key(job_id))?;
        Ok(())
    }

    /// Store or replace a download session
    pub fn put_session(&self, session: &Session) -> Result<()> {
        let value = serde_json::to_vec(session)?;
        self.sessions.insert(encode_session_key(&session.token), value)?;
        debug!(job_id = %session.job_id, "Stored session");
        Ok(())
    }

    /// Look up a session; expired sessions read as absent
    pub fn get_session(&self, token: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        let Some(value) = self.sessions.get(encode_session_key(token))? else {
            return Ok(None);
        };
        let session: Session = serde_json::from_slice(&value)?;
        Ok((session.expires_at > now).then_some(session))
    }

    pub fn remove_session(&self, token: &str) -> Result<()> {
        self.sessions.remove(encode_session_key(token))?;
        Ok(())
    }

    /// Prune stale progress entries and expired sessions
    pub fn prune_expired(
        &self,
        progress_cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PruneStats> {
        pruning::prune_expired(
            &self.progress,
            &self.sessions,
            &self.metadata,
            progress_cutoff,
            now,
        )
    }

    pub fn last_prune(&self) -> Result<Option<DateTime<Utc>>> {
        pruning::last_prune(&self.metadata)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Health check: the metadata partition must be readable
    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(b"meta:last_prune")?;
        Ok(())
    }

    /// Entry counts (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        let mut progress_count = 0;
        let mut session_count = 0;

        for item in self.progress.iter() {
            item?;
            progress_count += 1;
        }

        for item in self.sessions.iter() {
            item?;
            session_count += 1;
        }

        Ok(StoreStats {
            progress_count,
            session_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub progress_count: usize,
    pub session_count: usize,
}
