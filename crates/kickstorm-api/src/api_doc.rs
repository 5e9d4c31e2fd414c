//! OpenAPI document aggregation.

use utoipa::OpenApi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::upload_zip::upload_zip,
        handlers::file_upload::upload_file,
        handlers::finalize::finalize_upload,
        handlers::sessions::delete_session,
        handlers::sync_status::sync_status,
        handlers::tree::file_tree,
        handlers::sign::sign_file,
        handlers::download::download_file,
    ),
    components(schemas(
        crate::error::ErrorResponse,
        crate::state::SyncDispatchResult,
        kickstorm_core::models::UploadSession,
        kickstorm_core::models::SessionFile,
        kickstorm_core::models::SessionStatus,
        kickstorm_core::models::FileEntryStatus,
        kickstorm_core::models::UploadKind,
        kickstorm_core::models::SyncMethod,
        kickstorm_core::models::HistoryEntry,
        kickstorm_core::models::RepoFile,
        kickstorm_core::models::PublishReport,
        kickstorm_core::models::PublishMethod,
        kickstorm_core::models::FilteredFile,
        handlers::health::HealthResponse,
        handlers::upload_zip::UploadZipResponse,
        handlers::upload_zip::SkippedEntryInfo,
        handlers::file_upload::UploadFileResponse,
        handlers::finalize::FinalizeRequest,
        handlers::finalize::FinalizeResponse,
        handlers::sessions::DeleteSessionResponse,
        handlers::sync_status::RepositoryInfo,
        handlers::sync_status::SyncStatusResponse,
        handlers::tree::FileTreeResponse,
        handlers::sign::SignFileRequest,
        handlers::sign::SignFileResponse,
    )),
    tags(
        (name = "uploads", description = "Workspace upload sessions"),
        (name = "sync", description = "Remote synchronization status"),
        (name = "files", description = "Synced file tree and downloads"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "KICKStorm Workspace API",
        description = "Workspace upload and synchronization pipeline"
    )
)]
pub struct ApiDoc;
