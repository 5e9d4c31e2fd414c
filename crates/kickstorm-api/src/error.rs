//! HTTP error response conversion
//!
//! This module provides HTTP-specific error response conversion for AppError.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kickstorm_archive::ExtractError;
use kickstorm_core::tokens::TokenError;
use kickstorm_core::{AppError, ErrorMetadata, LogLevel};
use kickstorm_remote::RemoteError;
use kickstorm_workspace::WorkspaceError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
    /// Suggested action for the client (e.g., "Retry after a short delay")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse
/// This is necessary because of Rust's orphan rules - we can't implement
/// IntoResponse (external trait) for AppError (external type from kickstorm-core)
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

/// Helper function to log errors based on their log level
fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Error occurred");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;
        let is_production = is_production_env();

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        // Always hide details in production; outside production only
        // non-sensitive errors expose the detailed chain.
        let details = if is_production || app_error.is_sensitive() {
            None
        } else {
            Some(app_error.detailed_message())
        };

        let body = Json(ErrorResponse {
            error: app_error.client_message(),
            details,
            code: app_error.error_code().to_string(),
            recoverable: app_error.is_recoverable(),
            suggested_action: app_error.suggested_action().map(String::from),
        });

        (status, body).into_response()
    }
}

// Convert domain errors to HttpAppError (avoids orphan rule: we impl for local HttpAppError)

impl From<WorkspaceError> for HttpAppError {
    fn from(err: WorkspaceError) -> Self {
        let app = match err {
            WorkspaceError::SessionNotFound(id) => {
                AppError::NotFound(format!("Upload session not found: {}", id))
            }
            WorkspaceError::Protected(msg) => AppError::SessionProtected(msg),
            WorkspaceError::InvalidPath(msg) => AppError::InvalidPath(msg),
            WorkspaceError::Metadata(e) => {
                AppError::Internal(format!("Session metadata unreadable: {}", e))
            }
            WorkspaceError::Io { path, source } => {
                AppError::Internal(format!("Workspace IO error at {}: {}", path.display(), source))
            }
        };
        HttpAppError(app)
    }
}

impl From<ExtractError> for HttpAppError {
    fn from(err: ExtractError) -> Self {
        let app = match err {
            ExtractError::ArchiveTooLarge { size, max } => AppError::PayloadTooLarge(format!(
                "Archive of {} bytes exceeds the limit of {} bytes",
                size, max
            )),
            ExtractError::TooManyEntries { count, max } => AppError::ArchiveLimitExceeded(
                format!("{} entries exceed the limit of {}", count, max),
            ),
            ExtractError::ExpandedTooLarge { max } => AppError::ArchiveLimitExceeded(format!(
                "Expanded size exceeds the limit of {} bytes",
                max
            )),
            ExtractError::UnsupportedFormat(name) => {
                AppError::InvalidInput(format!("Unsupported archive format: {}", name))
            }
            ExtractError::Corrupt(msg) => AppError::ArchiveCorrupt(msg),
            ExtractError::PathEscape(entry) => {
                AppError::ArchiveCorrupt(format!("entry escapes the extraction root: {}", entry))
            }
            ExtractError::CaseCollision(msg) => {
                AppError::ArchiveCorrupt(format!("case-colliding entries: {}", msg))
            }
            ExtractError::NoValidFiles => {
                AppError::ArchiveCorrupt("archive contains no valid files".to_string())
            }
            ExtractError::Io(e) => AppError::Internal(format!("Extraction IO error: {}", e)),
        };
        HttpAppError(app)
    }
}

impl From<RemoteError> for HttpAppError {
    fn from(err: RemoteError) -> Self {
        HttpAppError(AppError::RemoteUnavailable(err.to_string()))
    }
}

impl From<TokenError> for HttpAppError {
    fn from(err: TokenError) -> Self {
        let app = match err {
            TokenError::Expired => AppError::TokenExpired,
            TokenError::Invalid => AppError::TokenInvalid,
        };
        HttpAppError(app)
    }
}

impl From<kickstorm_core::paths::PathError> for HttpAppError {
    fn from(err: kickstorm_core::paths::PathError) -> Self {
        HttpAppError(AppError::InvalidPath(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_workspace_error_not_found() {
        let err = WorkspaceError::SessionNotFound("abc".to_string());
        let HttpAppError(app) = err.into();
        match app {
            AppError::NotFound(msg) => assert!(msg.contains("abc")),
            _ => panic!("Expected NotFound variant"),
        }
    }

    #[test]
    fn test_from_workspace_error_protected() {
        let err = WorkspaceError::Protected("session x is syncing".to_string());
        let HttpAppError(app) = err.into();
        assert_eq!(app.http_status_code(), 400);
        assert_eq!(app.error_code(), "SESSION_PROTECTED");
    }

    #[test]
    fn test_from_extract_error_limits() {
        let err = ExtractError::TooManyEntries { count: 5001, max: 5000 };
        let HttpAppError(app) = err.into();
        assert_eq!(app.http_status_code(), 413);
        assert_eq!(app.error_code(), "ARCHIVE_LIMIT_EXCEEDED");

        let err = ExtractError::Corrupt("bad header".to_string());
        let HttpAppError(app) = err.into();
        assert_eq!(app.http_status_code(), 400);
        assert_eq!(app.error_code(), "ARCHIVE_CORRUPT");
    }

    #[test]
    fn test_from_token_errors() {
        let HttpAppError(expired) = TokenError::Expired.into();
        assert_eq!(expired.http_status_code(), 410);
        let HttpAppError(invalid) = TokenError::Invalid.into();
        assert_eq!(invalid.http_status_code(), 400);
    }

    #[test]
    fn test_from_remote_error() {
        let err = RemoteError::Transient("connect refused".to_string());
        let HttpAppError(app) = err.into();
        assert_eq!(app.http_status_code(), 503);
    }
}
