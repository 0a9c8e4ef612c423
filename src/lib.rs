pub mod api;
pub mod config;
pub mod extractor;
pub mod humanize;
pub mod ledger;
pub mod observability;
pub mod progress;
pub mod queue;
pub mod source;
pub mod storage;
pub mod task;
pub mod worker;
