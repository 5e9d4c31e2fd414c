//! Error types module
//!
//! This module provides the core error types used throughout the KICKStorm
//! workspace pipeline. All errors are unified under the `AppError` enum which
//! can represent path validation, archive, workspace, token, and remote
//! publication errors.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "ARCHIVE_CORRUPT")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Archive limit exceeded: {0}")]
    ArchiveLimitExceeded(String),

    #[error("Archive corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("Session is protected: {0}")]
    SessionProtected(String),

    #[error("File token expired")]
    TokenExpired,

    #[error("File token invalid")]
    TokenInvalid,

    #[error("Remote repository unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

// Error conversion implementations following Rust best practices
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
/// Reduces duplication in ErrorMetadata impl; client_message stays per-variant for dynamic content.
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::InvalidPath(_) => (
            400,
            "INVALID_PATH",
            false,
            Some("Use a relative path without traversal segments"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Forbidden(_) => (
            403,
            "NOT_A_MEMBER",
            false,
            Some("Request project membership before uploading"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "SIZE_LIMIT",
            false,
            Some("Reduce file size or use chunked upload"),
            false,
            LogLevel::Debug,
        ),
        AppError::ArchiveLimitExceeded(_) => (
            413,
            "ARCHIVE_LIMIT_EXCEEDED",
            false,
            Some("Split the archive or remove large artifacts"),
            false,
            LogLevel::Warn,
        ),
        AppError::ArchiveCorrupt(_) => (
            400,
            "ARCHIVE_CORRUPT",
            false,
            Some("Re-create the archive and try again"),
            false,
            LogLevel::Warn,
        ),
        AppError::SessionProtected(_) => (
            400,
            "SESSION_PROTECTED",
            false,
            Some("Completed or syncing sessions cannot be modified"),
            false,
            LogLevel::Debug,
        ),
        AppError::TokenExpired => (
            410,
            "TOKEN_EXPIRED",
            true,
            Some("Request a fresh download token"),
            false,
            LogLevel::Debug,
        ),
        AppError::TokenInvalid => (
            400,
            "TOKEN_INVALID",
            false,
            Some("Request a fresh download token"),
            false,
            LogLevel::Debug,
        ),
        AppError::RemoteUnavailable(_) => (
            503,
            "REMOTE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::InvalidPath(_) => "InvalidPath",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Forbidden(_) => "Forbidden",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::ArchiveLimitExceeded(_) => "ArchiveLimitExceeded",
            AppError::ArchiveCorrupt(_) => "ArchiveCorrupt",
            AppError::SessionProtected(_) => "SessionProtected",
            AppError::TokenExpired => "TokenExpired",
            AppError::TokenInvalid => "TokenInvalid",
            AppError::RemoteUnavailable(_) => "RemoteUnavailable",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::InvalidPath(ref msg) => msg.clone(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Forbidden(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::ArchiveLimitExceeded(ref msg) => msg.clone(),
            AppError::ArchiveCorrupt(ref msg) => msg.clone(),
            AppError::SessionProtected(ref msg) => msg.clone(),
            AppError::TokenExpired => "Download token has expired".to_string(),
            AppError::TokenInvalid => "Download token is invalid".to_string(),
            AppError::RemoteUnavailable(_) => "Remote repository is unavailable".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_invalid_path() {
        let err = AppError::InvalidPath("Relative path is required".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_PATH");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "Relative path is required");
        assert!(!err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_error_metadata_token_expired() {
        let err = AppError::TokenExpired;
        assert_eq!(err.http_status_code(), 410);
        assert_eq!(err.error_code(), "TOKEN_EXPIRED");
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_error_metadata_remote_unavailable() {
        let err = AppError::RemoteUnavailable("connect timeout".to_string());
        assert_eq!(err.http_status_code(), 503);
        assert_eq!(err.error_code(), "REMOTE_UNAVAILABLE");
        assert!(err.is_recoverable());
        assert!(err.is_sensitive());
        assert_eq!(err.client_message(), "Remote repository is unavailable");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_error_metadata_archive_limit() {
        let err = AppError::ArchiveLimitExceeded("5001 entries exceed the limit of 5000".to_string());
        assert_eq!(err.http_status_code(), 413);
        assert_eq!(err.error_code(), "ARCHIVE_LIMIT_EXCEEDED");
        assert!(err.client_message().contains("5001"));
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_error_metadata_suggested_actions() {
        let err1 = AppError::NotFound("test".to_string());
        assert_eq!(err1.suggested_action(), Some("Verify the resource ID exists"));

        let err2 = AppError::TokenExpired;
        assert_eq!(err2.suggested_action(), Some("Request a fresh download token"));
    }
}
