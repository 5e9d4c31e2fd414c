use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which publish strategy produced the commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PublishMethod {
    /// Tree-API batches, one commit per batch of files.
    Batch,
    /// Per-file contents-API uploads (fallback when a tree batch fails).
    Sequential,
}

/// A file refused before publication, with the filter's reason.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FilteredFile {
    pub path: String,
    pub reason: String,
}

/// Result of one `publish` invocation. Partial failures in a batch surface
/// here with per-file reasons rather than as a hard error.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublishReport {
    /// Commits created on the branch, in order.
    pub commit_refs: Vec<String>,
    pub method: PublishMethod,
    /// Number of files published.
    pub success: usize,
    /// Number of files that failed every attempt.
    pub failed: usize,
    /// Files refused by the safety filter.
    pub blocked: Vec<FilteredFile>,
    /// Files refused by the sync filter but not dangerous.
    pub ignored: Vec<FilteredFile>,
    pub errors: Vec<String>,
}

impl PublishReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }

    /// The ref recorded in history: the last commit of the publish.
    pub fn final_commit(&self) -> Option<&str> {
        self.commit_refs.last().map(String::as_str)
    }
}
