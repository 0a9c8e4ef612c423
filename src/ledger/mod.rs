/// Fjall-backed key-value ledger shared by the HTTP surface and the workers
///
/// Holds the small, short-lived records that coordinate the two tiers:
///
/// - Progress entries written by fetch workers and read by status polls
/// - Download sessions binding a client token to a job and its artifact
/// - Metadata (pruning state)
///
/// None of this needs to survive a restart; it is persisted only because the
/// store is shared across tiers. Stale entries are pruned by the retention
/// sweeper via [`FjallStore::prune_expired`].
///
/// ## Usage
///
/// ```rust,ignore
/// use mediafetch::ledger::FjallStore;
///
/// let store = FjallStore::open("data/ledger")?;
/// let entry = store.get_progress("0192...")?;
/// ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{LedgerError, Result};
pub use pruning::PruneStats;
pub use store::{FjallStore, StoreStats};
