//! Signed download token issuance.

use crate::auth::{require_member, UserContext};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use kickstorm_core::{paths, tokens, AppError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignFileRequest {
    pub path: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignFileResponse {
    pub success: bool,
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/v0/projects/{project_id}/files/sign",
    tag = "files",
    params(
        ("project_id" = i64, Path, description = "Project ID")
    ),
    request_body = SignFileRequest,
    responses(
        (status = 200, description = "Short-lived download token", body = SignFileResponse),
        (status = 400, description = "Invalid path", body = ErrorResponse),
        (status = 403, description = "Not a project member", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
pub async fn sign_file(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(project_id): Path<i64>,
    Json(request): Json<SignFileRequest>,
) -> Result<Json<SignFileResponse>, HttpAppError> {
    require_member(&state, project_id, user).await?;

    let sanitized = paths::sanitize(&request.path)?;
    let file_path = state.store.repo_file_path(project_id, &sanitized)?;
    if !file_path.is_file() {
        return Err(HttpAppError(AppError::NotFound(format!(
            "File not found: {}",
            sanitized
        ))));
    }

    // Authorization is delegated to the act of issuance; the token itself
    // carries no user identity.
    let token = tokens::sign(
        project_id,
        &sanitized,
        state.token_secret(),
        &state.config.file_token_salt,
    );

    Ok(Json(SignFileResponse {
        success: true,
        token,
    }))
}
