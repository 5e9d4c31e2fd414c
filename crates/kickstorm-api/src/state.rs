//! Application state.

use std::sync::{Arc, Weak};
use std::time::Duration;

use kickstorm_core::models::{PublishReport, SessionStatus, SyncMethod};
use kickstorm_core::{Config, ProjectDirectory};
use kickstorm_remote::RemotePublisher;
use kickstorm_worker::{SyncContext, SyncQueue, SyncQueueConfig};
use kickstorm_workspace::WorkspaceStore;
use serde::Serialize;
use utoipa::ToSchema;

/// Result of dispatching a sync for one session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncDispatchResult {
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<SyncMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PublishReport>,
    pub message: String,
}

/// Main application state shared by handlers, the dispatcher, and the
/// async sync worker.
pub struct AppState {
    pub config: Config,
    pub store: WorkspaceStore,
    pub projects: Arc<dyn ProjectDirectory>,
    /// Present when remote publishing is configured; absent means uploads
    /// stage locally and finalize reports the remote as unavailable.
    pub publisher: Option<RemotePublisher>,
    pub queue: SyncQueue,
}

impl AppState {
    /// Build the state and its sync queue. The queue holds a weak reference
    /// back to the state (it implements `SyncContext`), hence the cyclic
    /// construction.
    pub fn new(
        config: Config,
        projects: Arc<dyn ProjectDirectory>,
        publisher: Option<RemotePublisher>,
    ) -> Arc<Self> {
        let store = WorkspaceStore::new(
            config.workspace_root.clone(),
            config.session_stuck_sync_seconds,
            config.history_limit,
        );
        let queue_config = SyncQueueConfig {
            max_workers: config.queue_max_workers,
            max_retries: config.queue_max_retries,
            retry_base_delay: Duration::from_secs(config.queue_retry_base_delay_seconds),
        };

        Arc::new_cyclic(|weak: &Weak<AppState>| {
            let context: Weak<dyn SyncContext> = weak.clone();
            AppState {
                store,
                projects,
                publisher,
                queue: SyncQueue::new(queue_config, context),
                config,
            }
        })
    }

    pub fn fast_path_deadline(&self) -> Duration {
        Duration::from_secs(self.config.sync_fast_path_timeout_seconds)
    }

    pub fn token_secret(&self) -> &[u8] {
        self.config.file_token_secret.as_bytes()
    }
}

#[allow(dead_code)]
fn _assert_app_state_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    assert_send::<AppState>();
    assert_sync::<AppState>();
}
