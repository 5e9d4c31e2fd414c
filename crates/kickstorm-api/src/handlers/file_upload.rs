//! Single-file upload with optional chunking.
//!
//! Chunks for one path must be sent sequentially by the caller; the server
//! appends in arrival order and flips the file entry to complete on the
//! final chunk.

use crate::auth::{require_member, UserContext};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use kickstorm_core::models::{FileEntryStatus, SessionStatus, UploadKind, UploadSession};
use kickstorm_core::{paths, AppError};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadFileResponse {
    pub success: bool,
    pub session_id: String,
    pub path: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
}

#[derive(Default)]
struct UploadForm {
    data: Option<bytes::Bytes>,
    relative_path: Option<String>,
    session_id: Option<String>,
    chunk_index: Option<u32>,
    total_chunks: Option<u32>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, HttpAppError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        HttpAppError(AppError::InvalidInput(format!("Invalid multipart body: {}", e)))
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                form.data = Some(field.bytes().await.map_err(|e| {
                    HttpAppError(AppError::InvalidInput(format!(
                        "Failed to read file body: {}",
                        e
                    )))
                })?);
            }
            Some("relative_path") | Some("path") => {
                form.relative_path = Some(read_text(field).await?);
            }
            Some("session_id") => {
                form.session_id = Some(read_text(field).await?);
            }
            Some("chunk_index") => {
                form.chunk_index = Some(parse_number(&read_text(field).await?, "chunk_index")?);
            }
            Some("total_chunks") => {
                form.total_chunks = Some(parse_number(&read_text(field).await?, "total_chunks")?);
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, HttpAppError> {
    field.text().await.map_err(|e| {
        HttpAppError(AppError::InvalidInput(format!("Invalid form field: {}", e)))
    })
}

fn parse_number(raw: &str, what: &str) -> Result<u32, HttpAppError> {
    raw.trim().parse().map_err(|_| {
        HttpAppError(AppError::InvalidInput(format!(
            "{} must be a non-negative integer",
            what
        )))
    })
}

#[utoipa::path(
    post,
    path = "/api/v0/projects/{project_id}/files",
    tag = "uploads",
    params(
        ("project_id" = i64, Path, description = "Project ID")
    ),
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File or chunk staged", body = UploadFileResponse),
        (status = 400, description = "Invalid path or form", body = ErrorResponse),
        (status = 403, description = "Not a project member", body = ErrorResponse),
        (status = 413, description = "File exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(project_id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<UploadFileResponse>, HttpAppError> {
    require_member(&state, project_id, user).await?;

    let form = read_form(multipart).await?;
    let data = form
        .data
        .ok_or_else(|| HttpAppError(AppError::InvalidInput("No file uploaded".to_string())))?;
    let raw_path = form.relative_path.ok_or_else(|| {
        HttpAppError(AppError::InvalidInput("relative_path is required".to_string()))
    })?;

    let sanitized = paths::sanitize(&raw_path)?;
    if let Err(reason) = paths::ensure_safe(&sanitized) {
        return Err(HttpAppError(AppError::InvalidPath(reason)));
    }

    let chunked = match (form.chunk_index, form.total_chunks) {
        (Some(index), Some(total)) => {
            if total == 0 || index >= total {
                return Err(HttpAppError(AppError::InvalidInput(format!(
                    "chunk_index {} is out of range for total_chunks {}",
                    index, total
                ))));
            }
            Some((index, total))
        }
        (None, None) => None,
        _ => {
            return Err(HttpAppError(AppError::InvalidInput(
                "chunk_index and total_chunks must be sent together".to_string(),
            )));
        }
    };

    if chunked.is_none() && data.len() as u64 > state.config.max_file_bytes {
        return Err(HttpAppError(AppError::PayloadTooLarge(format!(
            "File of {} bytes exceeds the limit of {} bytes",
            data.len(),
            state.config.max_file_bytes
        ))));
    }

    let session_id = form
        .session_id
        .unwrap_or_else(UploadSession::generate_id);
    let session_dir = state.store.session_dir(project_id, &session_id)?;
    let dest = state.store.staged_file_path(&session_dir, &sanitized)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HttpAppError(AppError::Internal(format!("IO error: {}", e))))?;
    }

    // Chunk 0 (or an unchunked upload) truncates; later chunks append.
    let append = matches!(chunked, Some((index, _)) if index > 0);
    let mut file = OpenOptions::new()
        .create(true)
        .append(append)
        .write(true)
        .truncate(!append)
        .open(&dest)
        .map_err(|e| HttpAppError(AppError::Internal(format!("IO error: {}", e))))?;
    file.write_all(&data)
        .map_err(|e| HttpAppError(AppError::Internal(format!("IO error: {}", e))))?;
    file.flush()
        .map_err(|e| HttpAppError(AppError::Internal(format!("IO error: {}", e))))?;
    drop(file);

    let size = std::fs::metadata(&dest)
        .map_err(|e| HttpAppError(AppError::Internal(format!("IO error: {}", e))))?
        .len();
    if size > state.config.max_file_bytes {
        let _ = std::fs::remove_file(&dest);
        return Err(HttpAppError(AppError::PayloadTooLarge(format!(
            "Assembled file of {} bytes exceeds the limit of {} bytes",
            size, state.config.max_file_bytes
        ))));
    }

    let mut session = state
        .store
        .load_metadata(&session_dir)?
        .unwrap_or_else(|| {
            UploadSession::new(session_id.clone(), project_id, UploadKind::Manual)
        });
    if session.initiated_by.is_none() {
        session.initiated_by = Some(user.user_id);
    }

    let file_status = match chunked {
        None => FileEntryStatus::Complete,
        Some((index, total)) if index + 1 == total => FileEntryStatus::Complete,
        Some(_) => FileEntryStatus::Pending,
    };
    session.upsert_file(&sanitized, size, file_status);
    session.set_status(SessionStatus::InProgress);
    state.store.save_metadata(&session_dir, &session)?;

    tracing::debug!(
        project_id = project_id,
        session_id = %session_id,
        path = %sanitized,
        size = size,
        chunk = ?chunked,
        "File staged in session"
    );

    Ok(Json(UploadFileResponse {
        success: true,
        session_id,
        path: sanitized,
        size,
        chunk_index: chunked.map(|(index, _)| index),
        total_chunks: chunked.map(|(_, total)| total),
    }))
}
