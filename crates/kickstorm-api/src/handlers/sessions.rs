//! Session cancellation.

use crate::auth::{require_member, UserContext};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteSessionResponse {
    pub success: bool,
    pub session_id: String,
}

#[utoipa::path(
    delete,
    path = "/api/v0/projects/{project_id}/sessions/{session_id}",
    tag = "uploads",
    params(
        ("project_id" = i64, Path, description = "Project ID"),
        ("session_id" = String, Path, description = "Upload session ID")
    ),
    responses(
        (status = 200, description = "Session deleted", body = DeleteSessionResponse),
        (status = 400, description = "Session is completed or syncing", body = ErrorResponse),
        (status = 403, description = "Not a project member", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path((project_id, session_id)): Path<(i64, String)>,
) -> Result<Json<DeleteSessionResponse>, HttpAppError> {
    require_member(&state, project_id, user).await?;

    // A cancel on a session stuck in syncing is refused here; the
    // auto-recovery sweep will eventually release it.
    state.store.delete_session(project_id, &session_id)?;

    Ok(Json(DeleteSessionResponse {
        success: true,
        session_id,
    }))
}
