//! Query orchestration layer
//!
//! - `worker` - one query at a time: candidate search, seed-and-extend,
//!   filtering, deduplication and ranking, with a per-batch alignment cache
//! - `pool` - a fixed set of workers on scoped threads fed by a bounded queue
//!
//! The database view is shared read-only; everything mutable (caches,
//! statistics, DP workspaces) is owned by exactly one worker thread.

pub mod pool;
pub mod worker;

pub use pool::AlignerPool;
pub use worker::{AlignerWorker, WorkerStats};
