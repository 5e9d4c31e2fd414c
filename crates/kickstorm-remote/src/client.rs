//! Remote repository client abstraction.
//!
//! The pipeline needs only conventional versioned-store operations: create
//! repository, read branch head, create blob/tree/commit, update ref, and a
//! per-file contents upload for the sequential fallback.

use async_trait::async_trait;
use thiserror::Error;

/// One file to publish.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub path: String,
    pub content: Vec<u8>,
    /// Git file mode; regular files unless the caller says otherwise.
    pub mode: String,
    /// Optional caller-supplied commit message for this file.
    pub message: Option<String>,
}

impl RemoteFile {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
            mode: "100644".to_string(),
            message: None,
        }
    }
}

/// Branch tip: the commit and the tree it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub sha: String,
    pub tree_sha: String,
}

/// Entry in a tree-create request.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    pub sha: String,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network failures and 5xx responses; retried by the publisher.
    #[error("transient remote error: {0}")]
    Transient(String),

    /// 4xx responses other than ref conflicts; not retried.
    #[error("permanent remote error: {0}")]
    Permanent(String),

    /// The branch moved under us during a ref update; re-read the head and
    /// rebuild the commit once, then treat as transient.
    #[error("ref update conflict: {0}")]
    RefConflict(String),

    #[error("branch not found: {0}")]
    BranchMissing(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::RefConflict(_))
    }
}

#[async_trait]
pub trait RemoteRepoClient: Send + Sync {
    /// Create the repository if missing (idempotent create-or-get);
    /// returns the canonical full name.
    async fn ensure_repo(
        &self,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<String, RemoteError>;

    /// Current tip of `branch`, or `BranchMissing`.
    async fn branch_head(&self, repo: &str, branch: &str) -> Result<CommitRef, RemoteError>;

    /// Upload a blob, returning its sha.
    async fn create_blob(&self, repo: &str, content: &[u8]) -> Result<String, RemoteError>;

    /// Build a tree on top of `base_tree`, returning the new tree sha. The
    /// base carries over every file not named in `entries`.
    async fn create_tree(
        &self,
        repo: &str,
        base_tree: Option<&str>,
        entries: &[TreeEntry],
    ) -> Result<String, RemoteError>;

    /// Create a commit, returning its sha.
    async fn create_commit(
        &self,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, RemoteError>;

    /// Fast-forward `branch` to `sha`.
    async fn update_ref(&self, repo: &str, branch: &str, sha: &str) -> Result<(), RemoteError>;

    /// Sequential fallback: upload one file via the contents API, producing
    /// one commit. Returns the commit sha.
    async fn upload_file(
        &self,
        repo: &str,
        branch: &str,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<String, RemoteError>;
}
