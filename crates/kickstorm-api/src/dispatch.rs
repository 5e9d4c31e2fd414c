//! Sync dispatch: fast in-process publish with a soft deadline, async queue
//! fallback, and the worker-side publish path. Both paths share
//! `publish_session_once`; the session `metadata.json` on disk is the source
//! of truth throughout.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use kickstorm_core::models::{
    HistoryEntry, PublishReport, SessionStatus, SyncMethod, UploadSession,
};
use kickstorm_core::{paths, AppError, ErrorMetadata};
use kickstorm_remote::RemoteFile;
use kickstorm_worker::{SyncContext, SyncJob, SyncOutcome};

use crate::error::HttpAppError;
use crate::state::{AppState, SyncDispatchResult};

/// Outcome of one publish run over a session.
pub(crate) enum SessionSync {
    Completed(PublishReport),
    AlreadyDone,
}

/// Workspace uploads live under this subtree of the remote repository.
const REMOTE_SUBTREE: &str = "workspace";

impl AppState {
    /// Read the session's staged files into publishable form. Filtering
    /// happens later in the batch builder so blocked/ignored files are
    /// reported, not silently dropped.
    fn collect_remote_files(&self, session_dir: &Path) -> Result<Vec<RemoteFile>, HttpAppError> {
        let staged = self.store.collect_staged_files(session_dir)?;
        let mut files = Vec::with_capacity(staged.len());
        for (rel, abs) in staged {
            let content = std::fs::read(&abs).map_err(|e| {
                HttpAppError(AppError::Internal(format!(
                    "failed to read staged file {}: {}",
                    rel, e
                )))
            })?;
            files.push(RemoteFile::new(format!("{}/{}", REMOTE_SUBTREE, rel), content));
        }
        Ok(files)
    }

    /// One full publish attempt for a session. Idempotent under duplicate
    /// delivery: a session already `completed` is never republished.
    pub(crate) async fn publish_session_once(
        &self,
        project_id: i64,
        session_id: &str,
        initiated_by: Option<i64>,
        method: SyncMethod,
    ) -> Result<SessionSync, HttpAppError> {
        let session_dir = self.store.existing_session_dir(project_id, session_id)?;
        let mut session = self
            .store
            .load_metadata(&session_dir)?
            .ok_or_else(|| HttpAppError(AppError::NotFound(format!(
                "Upload session not found: {}",
                session_id
            ))))?;

        if session.status == SessionStatus::Completed {
            return Ok(SessionSync::AlreadyDone);
        }

        let publisher = self.publisher.as_ref().ok_or_else(|| {
            HttpAppError(AppError::RemoteUnavailable(
                "remote publishing is disabled".to_string(),
            ))
        })?;
        let project = self.projects.find(project_id).await.ok_or_else(|| {
            HttpAppError(AppError::NotFound(format!("Project not found: {}", project_id)))
        })?;

        if initiated_by.is_some() && session.initiated_by.is_none() {
            session.initiated_by = initiated_by;
        }
        session.sync_method = Some(method);
        session.set_status(SessionStatus::Syncing);
        self.store.save_metadata(&session_dir, &session)?;

        let files = self.collect_remote_files(&session_dir)?;
        if files.is_empty() {
            session.mark_error("no valid files in the session");
            self.store.save_metadata(&session_dir, &session)?;
            self.record_history(&session, None);
            return Err(HttpAppError(AppError::InvalidInput(
                "no valid files in the session".to_string(),
            )));
        }

        let report = publisher
            .publish(&project, self.projects.as_ref(), files, None)
            .await
            .map_err(HttpAppError::from)?;

        if !report.is_success() {
            return Err(HttpAppError(AppError::RemoteUnavailable(format!(
                "publish failed for {} files: {}",
                report.failed,
                report.errors.join("; ")
            ))));
        }

        // Mirror only what the sync filter let through; repo/ tracks the
        // published snapshot exactly.
        let mirrored: Vec<String> = session
            .files
            .iter()
            .filter(|f| paths::ensure_syncable(&f.path).is_ok())
            .map(|f| f.path.clone())
            .collect();
        self.store
            .mirror_session(project_id, &session_dir, &mirrored)?;

        // Re-read before the terminal write: a concurrent worker may have
        // finished this session while we were publishing.
        let mut session = self
            .store
            .load_metadata(&session_dir)?
            .unwrap_or(session);
        if session.status == SessionStatus::Completed {
            return Ok(SessionSync::AlreadyDone);
        }
        session.sync_method = Some(method);
        session.sync_finished_at = Some(Utc::now());
        session.error = None;
        session.set_status(SessionStatus::Completed);
        self.store.save_metadata(&session_dir, &session)?;
        self.record_history(&session, report.final_commit());

        let method_name = match method {
            SyncMethod::Git => "git",
            SyncMethod::Async => "async",
        };
        tracing::info!(
            project_id = project_id,
            session_id = %session_id,
            files = session.file_count,
            commits = report.commit_refs.len(),
            method = method_name,
            "Session published"
        );

        Ok(SessionSync::Completed(report))
    }

    fn record_history(&self, session: &UploadSession, commit_ref: Option<&str>) {
        let entry = HistoryEntry {
            session_id: session.session_id.clone(),
            status: session.status,
            kind: session.kind,
            created_at: Utc::now(),
            file_count: session.file_count,
            total_size: session.total_size,
            commit_ref: commit_ref.map(str::to_string),
            initiated_by: session.initiated_by,
            error: session.error.clone(),
        };
        if let Err(e) = self.store.push_history(session.project_id, entry) {
            tracing::warn!(
                project_id = session.project_id,
                session_id = %session.session_id,
                error = %e,
                "Failed to record history entry"
            );
        }
    }

    /// Dispatch sync for a ready session: fast in-process publish under a
    /// soft deadline, falling back to the async queue on failure or expiry.
    pub(crate) async fn dispatch_sync(
        self: &Arc<Self>,
        project_id: i64,
        session_id: &str,
        initiated_by: Option<i64>,
    ) -> Result<SyncDispatchResult, HttpAppError> {
        if self.publisher.is_none() {
            return Err(HttpAppError(AppError::RemoteUnavailable(
                "remote publishing is disabled".to_string(),
            )));
        }

        let attempt = tokio::time::timeout(
            self.fast_path_deadline(),
            self.publish_session_once(project_id, session_id, initiated_by, SyncMethod::Git),
        )
        .await;

        let failure = match attempt {
            Ok(Ok(SessionSync::Completed(report))) => {
                let message = format!("Sync completed: {} files published", report.success);
                return Ok(SyncDispatchResult {
                    status: SessionStatus::Completed,
                    method: Some(SyncMethod::Git),
                    task_id: None,
                    report: Some(report),
                    message,
                });
            }
            Ok(Ok(SessionSync::AlreadyDone)) => {
                return Ok(SyncDispatchResult {
                    status: SessionStatus::Completed,
                    method: None,
                    task_id: None,
                    report: None,
                    message: "Session already synchronized".to_string(),
                });
            }
            Ok(Err(e)) => {
                // Client mistakes surface immediately; only publish-side
                // failures fall through to the queue.
                match e.0.error_code() {
                    "NOT_FOUND" | "INVALID_PATH" | "INVALID_INPUT" | "SESSION_PROTECTED" => {
                        return Err(e);
                    }
                    _ => Some(e),
                }
            }
            Err(_elapsed) => None,
        };

        if let Some(e) = &failure {
            tracing::warn!(
                project_id = project_id,
                session_id = %session_id,
                error = %e.0,
                "Fast-path publish failed, falling back to async sync"
            );
        } else {
            tracing::warn!(
                project_id = project_id,
                session_id = %session_id,
                deadline_secs = self.fast_path_deadline().as_secs(),
                "Fast-path publish exceeded the soft deadline, falling back to async sync"
            );
        }

        self.enqueue_async_sync(project_id, session_id, initiated_by)
            .await
    }

    async fn enqueue_async_sync(
        self: &Arc<Self>,
        project_id: i64,
        session_id: &str,
        initiated_by: Option<i64>,
    ) -> Result<SyncDispatchResult, HttpAppError> {
        let session_dir = self.store.existing_session_dir(project_id, session_id)?;
        let mut session = self
            .store
            .load_metadata(&session_dir)?
            .ok_or_else(|| HttpAppError(AppError::NotFound(format!(
                "Upload session not found: {}",
                session_id
            ))))?;

        let task_id = self
            .queue
            .submit(SyncJob {
                project_id,
                session_id: session_id.to_string(),
                initiated_by,
            })
            .map_err(|e| HttpAppError(AppError::Internal(e.to_string())))?;

        session.sync_method = Some(SyncMethod::Async);
        session.sync_task_id = Some(task_id.clone());
        session.set_status(SessionStatus::Syncing);
        self.store.save_metadata(&session_dir, &session)?;

        Ok(SyncDispatchResult {
            status: SessionStatus::Syncing,
            method: Some(SyncMethod::Async),
            task_id: Some(task_id),
            report: None,
            message: "Sync running in background".to_string(),
        })
    }
}

#[async_trait]
impl SyncContext for AppState {
    async fn run_sync(self: Arc<Self>, job: &SyncJob) -> anyhow::Result<SyncOutcome> {
        match self
            .publish_session_once(
                job.project_id,
                &job.session_id,
                job.initiated_by,
                SyncMethod::Async,
            )
            .await
        {
            Ok(SessionSync::Completed(_)) => Ok(SyncOutcome::Completed),
            Ok(SessionSync::AlreadyDone) => Ok(SyncOutcome::AlreadyDone),
            Err(e) => Err(anyhow::anyhow!(e.0.to_string())),
        }
    }

    async fn mark_failed(self: Arc<Self>, job: &SyncJob, reason: &str) {
        let Ok(session_dir) = self
            .store
            .existing_session_dir(job.project_id, &job.session_id)
        else {
            return;
        };
        match self.store.load_metadata(&session_dir) {
            Ok(Some(mut session)) => {
                session.mark_error(reason);
                if let Err(e) = self.store.save_metadata(&session_dir, &session) {
                    tracing::error!(
                        session_id = %job.session_id,
                        error = %e,
                        "Failed to persist terminal sync failure"
                    );
                }
                self.record_history(&session, None);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    session_id = %job.session_id,
                    error = %e,
                    "Failed to load session while recording sync failure"
                );
            }
        }
    }
}
