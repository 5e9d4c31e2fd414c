//! Full-archive upload: extract into a fresh session and dispatch sync.

use crate::auth::{require_member, UserContext};
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::{AppState, SyncDispatchResult};
use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use kickstorm_archive::{extract_archive, ArchiveLimits};
use kickstorm_core::models::{FileEntryStatus, SessionStatus, UploadKind, UploadSession};
use kickstorm_core::AppError;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct SkippedEntryInfo {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadZipResponse {
    pub success: bool,
    pub session_id: String,
    pub status: SessionStatus,
    pub file_count: usize,
    pub total_size: u64,
    /// Entries refused by the safety filter, with reasons.
    pub skipped: Vec<SkippedEntryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncDispatchResult>,
}

#[utoipa::path(
    post,
    path = "/api/v0/projects/{project_id}/upload-zip",
    tag = "uploads",
    params(
        ("project_id" = i64, Path, description = "Project ID")
    ),
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Archive extracted and sync dispatched", body = UploadZipResponse),
        (status = 400, description = "Invalid or corrupt archive", body = ErrorResponse),
        (status = 403, description = "Not a project member", body = ErrorResponse),
        (status = 413, description = "Archive exceeds a size limit", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn upload_zip(
    State(state): State<Arc<AppState>>,
    user: UserContext,
    Path(project_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<UploadZipResponse>, HttpAppError> {
    require_member(&state, project_id, user).await?;

    let mut archive: Option<(String, bytes::Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        HttpAppError(AppError::InvalidInput(format!("Invalid multipart body: {}", e)))
    })? {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| {
                    HttpAppError(AppError::InvalidInput(
                        "The archive must have a filename".to_string(),
                    ))
                })?;
            let data = field.bytes().await.map_err(|e| {
                HttpAppError(AppError::InvalidInput(format!(
                    "Failed to read archive body: {}",
                    e
                )))
            })?;
            archive = Some((filename, data));
        }
    }

    let (filename, data) = archive.ok_or_else(|| {
        HttpAppError(AppError::InvalidInput("No archive uploaded".to_string()))
    })?;
    if data.is_empty() {
        return Err(HttpAppError(AppError::InvalidInput(
            "Uploaded archive is empty".to_string(),
        )));
    }
    if data.len() as u64 > state.config.max_archive_bytes {
        return Err(HttpAppError(AppError::PayloadTooLarge(format!(
            "Archive of {} bytes exceeds the limit of {} bytes",
            data.len(),
            state.config.max_archive_bytes
        ))));
    }

    let session_id = UploadSession::generate_id();
    let session_dir = state.store.session_dir(project_id, &session_id)?;
    let mut session = UploadSession::new(session_id.clone(), project_id, UploadKind::Zip);
    session.initiated_by = Some(user.user_id);

    tracing::info!(
        project_id = project_id,
        session_id = %session_id,
        archive = %filename,
        size = data.len(),
        "Starting archive extraction"
    );

    let limits = ArchiveLimits {
        max_archive_bytes: state.config.max_archive_bytes,
        max_extracted_bytes: state.config.max_extracted_bytes,
        max_file_count: state.config.max_files,
    };

    // Extraction blocks this request task; that is the scheduling model for
    // upload requests.
    let extraction = match extract_archive(&data, &filename, &session_dir, &limits) {
        Ok(extraction) => extraction,
        Err(e) => {
            tracing::error!(
                project_id = project_id,
                session_id = %session_id,
                error = %e,
                "Archive extraction failed"
            );
            // The directory is retained for inspection; extraction failures
            // are never retried.
            session.mark_error(e.to_string());
            state.store.save_metadata(&session_dir, &session)?;
            return Err(e.into());
        }
    };

    for file in &extraction.accepted {
        session.upsert_file(&file.path, file.size, FileEntryStatus::Complete);
    }
    session.set_status(SessionStatus::Extracted);
    state.store.save_metadata(&session_dir, &session)?;

    tracing::info!(
        project_id = project_id,
        session_id = %session_id,
        file_count = session.file_count,
        total_size = session.total_size,
        skipped = extraction.skipped.len(),
        "Archive extracted into session"
    );

    // The zip path dispatches sync immediately; manual sessions wait for an
    // explicit finalize. A session whose entries were all skipped stays
    // extracted so the caller can inspect the skip list.
    let sync = if state.publisher.is_some() && session.file_count > 0 {
        match state
            .dispatch_sync(project_id, &session_id, Some(user.user_id))
            .await
        {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!(
                    project_id = project_id,
                    session_id = %session_id,
                    error = %e.0,
                    "Sync dispatch failed after extraction"
                );
                Some(SyncDispatchResult {
                    status: SessionStatus::Error,
                    method: None,
                    task_id: None,
                    report: None,
                    message: e.0.to_string(),
                })
            }
        }
    } else {
        None
    };

    // Dispatch rewrites the metadata; report the current state.
    let session = state
        .store
        .load_metadata(&session_dir)?
        .unwrap_or(session);

    Ok(Json(UploadZipResponse {
        success: true,
        session_id,
        status: session.status,
        file_count: session.file_count,
        total_size: session.total_size,
        skipped: extraction
            .skipped
            .into_iter()
            .map(|s| SkippedEntryInfo {
                path: s.path,
                reason: s.reason,
            })
            .collect(),
        sync,
    }))
}
