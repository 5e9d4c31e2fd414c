//! Sync status: per-session state or the project-level summary.
//!
//! Every listing runs the stale-session recovery sweep, which is the only
//! mechanism that unsticks a crashed publish.

use crate::auth::{require_member, UserContext};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use kickstorm_core::models::{HistoryEntry, SessionStatus, UploadSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

const HISTORY_PREVIEW: usize = 5;
const SESSION_PREVIEW: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SyncStatusQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RepositoryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    pub private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncStatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<UploadSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<UploadSession>>,
}

#[utoipa::path(
    get,
    path = "/api/v0/projects/{project_id}/sync-status",
    tag = "sync",
    params(
        ("project_id" = i64, Path, description = "Project ID"),
        ("session_id" = Option<String>, Query, description = "Limit to one session")
    ),
    responses(
        (status = 200, description = "Sync status", body = SyncStatusResponse),
        (status = 403, description = "Not a project member", body = ErrorResponse),
        (status = 404, description = "Project or session not found", body = ErrorResponse)
    )
)]
pub async fn sync_status(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(project_id): Path<i64>,
    Query(query): Query<SyncStatusQuery>,
) -> Result<Json<SyncStatusResponse>, HttpAppError> {
    let project = require_member(&state, project_id, user).await?;

    if let Some(session_id) = query.session_id {
        let session = state.store.load_session(project_id, &session_id)?;
        return Ok(Json(SyncStatusResponse {
            success: true,
            session: Some(session),
            repository: None,
            history: None,
            sessions: None,
        }));
    }

    let history = state.store.load_history(project_id, Some(HISTORY_PREVIEW))?;
    let sessions = state.store.list_sessions(project_id, Some(SESSION_PREVIEW))?;

    let last_sync_at = history
        .iter()
        .find(|entry| entry.status == SessionStatus::Completed)
        .map(|entry| entry.created_at);

    tracing::debug!(
        project_id = project_id,
        sessions = sessions.len(),
        "Sync status listed"
    );

    Ok(Json(SyncStatusResponse {
        success: true,
        session: None,
        repository: Some(RepositoryInfo {
            repo_name: project.repo_name,
            private: project.private,
            last_sync_at,
        }),
        history: Some(history),
        sessions: Some(sessions),
    }))
}
