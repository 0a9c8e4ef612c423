pub mod broker;
pub mod store;

pub use broker::{RecoveryStats, TaskBroker, TaskEnvelope};
pub use store::{FjallQueue, JobRecord, JobState, QueueError};
