//! Synced file tree listing.

use crate::auth::{require_member, UserContext};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use kickstorm_core::models::RepoFile;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

const TREE_LIMIT: usize = 500;

#[derive(Debug, Serialize, ToSchema)]
pub struct FileTreeResponse {
    pub success: bool,
    pub files: Vec<RepoFile>,
}

#[utoipa::path(
    get,
    path = "/api/v0/projects/{project_id}/files/tree",
    tag = "files",
    params(
        ("project_id" = i64, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Synced file tree", body = FileTreeResponse),
        (status = 403, description = "Not a project member", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    )
)]
pub async fn file_tree(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(project_id): Path<i64>,
) -> Result<Json<FileTreeResponse>, HttpAppError> {
    require_member(&state, project_id, user).await?;
    let files = state.store.repo_files(project_id, TREE_LIMIT)?;
    Ok(Json(FileTreeResponse {
        success: true,
        files,
    }))
}
