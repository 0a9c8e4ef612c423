/// Retention for ledger entries
use chrono::{DateTime, Utc};
use fjall::PartitionHandle;
use tracing::{debug, info};

use super::error::Result;
use super::partitions::{decode_progress_key, encode_meta_key};
use crate::api::models::Session;
use crate::progress::ProgressEntry;

const META_LAST_PRUNE: &str = "last_prune";

/// Pruning statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneStats {
    pub progress_pruned: usize,
    pub sessions_pruned: usize,
}

/// Removes progress entries not updated since `progress_cutoff` and sessions past their expiry
pub fn prune_expired(
    progress_partition: &PartitionHandle,
    sessions_partition: &PartitionHandle,
    metadata_partition: &PartitionHandle,
    progress_cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<PruneStats> {
    let stats = PruneStats {
        progress_pruned: prune_progress(progress_partition, progress_cutoff)?,
        sessions_pruned: prune_sessions(sessions_partition, now)?,
    };

    metadata_partition.insert(
        encode_meta_key(META_LAST_PRUNE),
        now.timestamp().to_string().as_bytes(),
    )?;

    if stats != PruneStats::default() {
        info!(
            progress = stats.progress_pruned,
            sessions = stats.sessions_pruned,
            "Pruned ledger entries"
        );
    }
    Ok(stats)
}

fn prune_progress(partition: &PartitionHandle, cutoff: DateTime<Utc>) -> Result<usize> {
    let mut expired = Vec::new();
    for item in partition.iter() {
        let (key, value) = item?;
        // Entries we can no longer decode are dropped as well
        let stale = match serde_json::from_slice::<ProgressEntry>(&value) {
            Ok(entry) => entry.updated_at < cutoff,
            Err(_) => true,
        };
        if stale {
            expired.push(key);
        }
    }

    for key in &expired {
        debug!(job_id = ?decode_progress_key(key), "Pruning progress entry");
        partition.remove(key.clone())?;
    }
    Ok(expired.len())
}

fn prune_sessions(partition: &PartitionHandle, now: DateTime<Utc>) -> Result<usize> {
    let mut expired = Vec::new();
    for item in partition.iter() {
        let (key, value) = item?;
        let stale = match serde_json::from_slice::<Session>(&value) {
            Ok(session) => session.expires_at <= now,
            Err(_) => true,
        };
        if stale {
            expired.push(key);
        }
    }

    for key in &expired {
        partition.remove(key.clone())?;
    }
    Ok(expired.len())
}

/// Reads the time of the last prune, if one has happened
pub fn last_prune(metadata_partition: &PartitionHandle) -> Result<Option<DateTime<Utc>>> {
    let Some(bytes) = metadata_partition.get(encode_meta_key(META_LAST_PRUNE))? else {
        return Ok(None);
    };
    let secs = std::str::from_utf8(&bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok());
    Ok(secs.and_then(|s| DateTime::from_timestamp(s, 0)))
}
