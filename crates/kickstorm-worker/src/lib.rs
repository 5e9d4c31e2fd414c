//! KICKStorm Worker – asynchronous sync queue and worker pool.
//!
//! This crate provides the sync job queue (worker pool, retry with
//! exponential backoff, graceful shutdown) and the `SyncContext` trait. The
//! API implements the trait for its application state; the actual publish
//! path lives there.

mod context;
mod queue;

pub use context::{empty_context_weak, SyncContext, SyncJob, SyncOutcome};
pub use queue::{SyncQueue, SyncQueueConfig};
