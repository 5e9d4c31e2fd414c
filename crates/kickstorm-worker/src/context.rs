//! Sync job context trait
//!
//! The API implements this trait for its application state. The worker calls
//! `run_sync` when processing a job; the implementation re-reads the session
//! metadata, runs the publish path, and writes the terminal state.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

/// One queued sync: re-publish this session for this project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub project_id: i64,
    pub session_id: String,
    pub initiated_by: Option<i64>,
}

/// What a sync run did with the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Session published and marked completed.
    Completed,
    /// Session was already terminal; nothing republished. Duplicate
    /// deliveries land here.
    AlreadyDone,
}

/// Context for sync dispatch.
///
/// Implemented by the API's application state. The worker holds a weak
/// reference and calls `run_sync` when processing a claimed job. The session
/// `metadata.json` is the source of truth: implementations MUST check for a
/// terminal state before republishing so duplicate delivery stays idempotent.
#[async_trait]
pub trait SyncContext: Send + Sync {
    async fn run_sync(self: Arc<Self>, job: &SyncJob) -> Result<SyncOutcome>;

    /// Record terminal failure once the retry budget is exhausted. The
    /// session must end up in the error state.
    async fn mark_failed(self: Arc<Self>, job: &SyncJob, reason: &str);
}

/// Placeholder context used when no real context exists yet (e.g. during init).
/// Sync always errors.
struct NoopContext;

#[async_trait]
impl SyncContext for NoopContext {
    async fn run_sync(self: Arc<Self>, _job: &SyncJob) -> Result<SyncOutcome> {
        Err(anyhow!("NoopContext: no sync context available"))
    }

    async fn mark_failed(self: Arc<Self>, job: &SyncJob, reason: &str) {
        tracing::error!(
            session_id = %job.session_id,
            reason = %reason,
            "NoopContext: dropping sync failure"
        );
    }
}

/// Returns a weak reference to a no-op context. Use as placeholder when
/// building the queue before the real AppState context exists.
pub fn empty_context_weak() -> Weak<dyn SyncContext> {
    let n: Arc<dyn SyncContext> = Arc::new(NoopContext);
    Arc::downgrade(&n)
}
