//! Finalize an upload session and dispatch synchronization.

use crate::auth::{require_member, UserContext};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::{AppState, SyncDispatchResult};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use kickstorm_core::models::SessionStatus;
use kickstorm_core::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct FinalizeRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FinalizeResponse {
    pub success: bool,
    pub session_id: String,
    #[serde(flatten)]
    pub sync: SyncDispatchResult,
}

#[utoipa::path(
    post,
    path = "/api/v0/projects/{project_id}/finalize-upload",
    tag = "uploads",
    params(
        ("project_id" = i64, Path, description = "Project ID")
    ),
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Session finalized and sync dispatched", body = FinalizeResponse),
        (status = 400, description = "Session cannot be finalized", body = ErrorResponse),
        (status = 403, description = "Not a project member", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 503, description = "Remote repository unavailable", body = ErrorResponse)
    )
)]
pub async fn finalize_upload(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(project_id): Path<i64>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Json<FinalizeResponse>, HttpAppError> {
    require_member(&state, project_id, user).await?;

    let session_dir = state
        .store
        .existing_session_dir(project_id, &request.session_id)?;
    let mut session = state.store.load_metadata(&session_dir)?.ok_or_else(|| {
        HttpAppError(AppError::NotFound(format!(
            "Upload session not found: {}",
            request.session_id
        )))
    })?;

    match session.status {
        SessionStatus::Pending
        | SessionStatus::InProgress
        | SessionStatus::Extracted
        | SessionStatus::Ready => {}
        SessionStatus::Syncing | SessionStatus::Completed => {
            return Err(HttpAppError(AppError::SessionProtected(format!(
                "session {} is {}",
                request.session_id, session.status
            ))));
        }
        SessionStatus::Error => {
            return Err(HttpAppError(AppError::InvalidInput(format!(
                "session {} failed and cannot be finalized",
                request.session_id
            ))));
        }
    }

    session.finalized_at = Some(Utc::now());
    session.set_status(SessionStatus::Ready);
    state.store.save_metadata(&session_dir, &session)?;

    tracing::info!(
        project_id = project_id,
        session_id = %request.session_id,
        file_count = session.file_count,
        "Upload session ready for sync"
    );

    let sync = state
        .dispatch_sync(project_id, &request.session_id, Some(user.user_id))
        .await?;

    Ok(Json(FinalizeResponse {
        success: true,
        session_id: request.session_id,
        sync,
    }))
}
