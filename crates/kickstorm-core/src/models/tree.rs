use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One file in the synced `repo/` tree. The path is sanitized, `/`-joined,
/// with no leading slash and no traversal segments.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RepoFile {
    pub path: String,
    pub size: u64,
    /// Best-effort MIME type guessed from the extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}
