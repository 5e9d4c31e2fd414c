//! Token-gated file download from the synced tree.

use crate::auth::{require_member, UserContext};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use kickstorm_core::{paths, tokens, AppError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub token: String,
}

#[utoipa::path(
    get,
    path = "/api/v0/projects/{project_id}/files/{path}",
    tag = "files",
    params(
        ("project_id" = i64, Path, description = "Project ID"),
        ("path" = String, Path, description = "File path inside the synced tree"),
        ("token" = String, Query, description = "Signed download token")
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 400, description = "Invalid token or path", body = ErrorResponse),
        (status = 403, description = "Token does not match this file", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 410, description = "Token expired", body = ErrorResponse)
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path((project_id, requested_path)): Path<(i64, String)>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, HttpAppError> {
    require_member(&state, project_id, user).await?;

    let payload = tokens::verify(
        &query.token,
        state.token_secret(),
        &state.config.file_token_salt,
        Duration::from_secs(state.config.file_token_max_age_seconds),
    )?;

    let sanitized = paths::sanitize(&requested_path)?;
    if payload.project_id != project_id || payload.path != sanitized {
        return Err(HttpAppError(AppError::Forbidden(
            "Token does not match this file".to_string(),
        )));
    }

    let file_path = state.store.repo_file_path(project_id, &sanitized)?;
    if !file_path.is_file() {
        return Err(HttpAppError(AppError::NotFound(format!(
            "File not found: {}",
            sanitized
        ))));
    }

    let file = tokio::fs::File::open(&file_path)
        .await
        .map_err(|e| HttpAppError(AppError::Internal(format!("IO error: {}", e))))?;
    let stream = ReaderStream::new(file);

    let mime = mime_guess::from_path(&file_path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    let filename = sanitized.rsplit('/').next().unwrap_or(&sanitized).to_string();

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", filename),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| HttpAppError(AppError::Internal(format!("Failed to build response: {}", e))))?;

    Ok(response.into_response())
}
