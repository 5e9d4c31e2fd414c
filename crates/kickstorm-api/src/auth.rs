//! Request identity and project membership gate.
//!
//! Accounts live outside this service. Requests arrive with an `X-User-Id`
//! header set by the authenticating front; every handler resolves the
//! project and checks membership before touching the workspace.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use kickstorm_core::{AppError, ProjectInfo};

use crate::error::HttpAppError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity extracted from the request headers.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: i64,
}

impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| {
                HttpAppError(AppError::Forbidden(
                    "Missing or invalid user identity".to_string(),
                ))
            })?;
        Ok(UserContext { user_id })
    }
}

/// Resolve the project and require membership for this user.
pub async fn require_member(
    state: &AppState,
    project_id: i64,
    user: UserContext,
) -> Result<ProjectInfo, HttpAppError> {
    let project = state.projects.find(project_id).await.ok_or_else(|| {
        HttpAppError(AppError::NotFound(format!(
            "Project not found: {}",
            project_id
        )))
    })?;
    if !project.is_member(user.user_id) {
        return Err(HttpAppError(AppError::Forbidden(
            "You are not a member of this project".to_string(),
        )));
    }
    Ok(project)
}
