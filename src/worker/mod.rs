//! Fetch workers
//!
//! [`FetchWorker`] turns one [`crate::task::FetchTask`] into a cached
//! artifact. [`spawn_workers`] runs a pool of them behind the broker's
//! channels and records each outcome in the job queue.

pub mod fetch;
pub mod runner;

pub use fetch::{FetchError, FetchPolicy, FetchWorker};
pub use runner::spawn_workers;
