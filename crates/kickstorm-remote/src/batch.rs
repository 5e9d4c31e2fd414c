//! Batch commit builder.
//!
//! Turns an arbitrary-size file set into the minimum number of commits the
//! remote allows: one commit per tree batch of at most `TREE_BATCH_LIMIT`
//! entries, never one commit per file. Transient failures retry with
//! exponential backoff; a batch that exhausts its retries falls back to
//! sequential per-file uploads for that batch only.

use std::time::Duration;

use kickstorm_core::models::{FilteredFile, PublishMethod, PublishReport};
use kickstorm_core::paths;

use crate::client::{CommitRef, RemoteError, RemoteFile, RemoteRepoClient, TreeEntry};

/// Per-request entry cap of the remote tree-create API.
pub const TREE_BATCH_LIMIT: usize = 100;

/// Retry policy for transient remote errors inside one publish call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        // 1x, 2x, 4x...
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

pub struct BatchCommitBuilder<'a> {
    client: &'a dyn RemoteRepoClient,
    retry: RetryPolicy,
}

impl<'a> BatchCommitBuilder<'a> {
    pub fn new(client: &'a dyn RemoteRepoClient) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(client: &'a dyn RemoteRepoClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Publish a file set as one logical commit (chunked at the tree API
    /// cap). Blocked and ignored files are filtered here and reported; they
    /// never reach the remote.
    pub async fn publish(
        &self,
        repo: &str,
        branch: &str,
        files: Vec<RemoteFile>,
        fallback_message: Option<&str>,
    ) -> Result<PublishReport, RemoteError> {
        let mut report = PublishReport {
            commit_refs: Vec::new(),
            method: PublishMethod::Batch,
            success: 0,
            failed: 0,
            blocked: Vec::new(),
            ignored: Vec::new(),
            errors: Vec::new(),
        };

        let mut publishable: Vec<RemoteFile> = Vec::new();
        for file in files {
            if let Err(reason) = paths::ensure_safe(&file.path) {
                report.blocked.push(FilteredFile {
                    path: file.path,
                    reason,
                });
            } else if let Err(reason) = paths::ensure_syncable(&file.path) {
                report.ignored.push(FilteredFile {
                    path: file.path,
                    reason,
                });
            } else {
                publishable.push(file);
            }
        }

        if publishable.is_empty() {
            tracing::info!(
                repo = %repo,
                blocked = report.blocked.len(),
                ignored = report.ignored.len(),
                "Nothing to publish after filtering"
            );
            return Ok(report);
        }

        let message = commit_message(&publishable, fallback_message);
        let batch_count = publishable.len().div_ceil(TREE_BATCH_LIMIT);
        let batches: Vec<Vec<RemoteFile>> = publishable
            .chunks(TREE_BATCH_LIMIT)
            .map(|chunk| chunk.to_vec())
            .collect();

        for (index, batch) in batches.into_iter().enumerate() {
            let batch_message = if batch_count > 1 {
                format!("{} [batch {}/{}]", message, index + 1, batch_count)
            } else {
                message.clone()
            };

            match self
                .publish_batch_with_retry(repo, branch, &batch, &batch_message)
                .await
            {
                Ok(commit_sha) => {
                    report.success += batch.len();
                    report.commit_refs.push(commit_sha);
                }
                Err(e) => {
                    tracing::warn!(
                        repo = %repo,
                        batch = index + 1,
                        error = %e,
                        "Tree-API batch failed, falling back to sequential uploads"
                    );
                    report.method = PublishMethod::Sequential;
                    self.publish_sequential(repo, branch, &batch, &mut report)
                        .await;
                }
            }
        }

        tracing::info!(
            repo = %repo,
            commits = report.commit_refs.len(),
            files = report.success,
            failed = report.failed,
            blocked = report.blocked.len(),
            ignored = report.ignored.len(),
            method = ?report.method,
            "Publish finished"
        );

        Ok(report)
    }

    async fn publish_batch_with_retry(
        &self,
        repo: &str,
        branch: &str,
        batch: &[RemoteFile],
        message: &str,
    ) -> Result<String, RemoteError> {
        let mut last_error: Option<RemoteError> = None;
        for attempt in 0..self.retry.max_attempts {
            match self.publish_batch(repo, branch, batch, message).await {
                Ok(sha) => return Ok(sha),
                Err(e) if e.is_transient() => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        repo = %repo,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient batch failure, backing off"
                    );
                    last_error = Some(e);
                    if attempt + 1 < self.retry.max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| RemoteError::Transient("batch retries exhausted".to_string())))
    }

    /// One batch, one commit: blobs, tree on the parent's base, commit,
    /// fast-forward. A ref conflict means another publisher won the race;
    /// re-read the head and rebuild once before giving up on the attempt.
    async fn publish_batch(
        &self,
        repo: &str,
        branch: &str,
        batch: &[RemoteFile],
        message: &str,
    ) -> Result<String, RemoteError> {
        let head = self.client.branch_head(repo, branch).await?;
        match self.build_commit(repo, branch, batch, message, &head).await {
            Ok(sha) => Ok(sha),
            Err(RemoteError::RefConflict(_)) => {
                let head = self.client.branch_head(repo, branch).await?;
                self.build_commit(repo, branch, batch, message, &head).await
            }
            Err(e) => Err(e),
        }
    }

    async fn build_commit(
        &self,
        repo: &str,
        branch: &str,
        batch: &[RemoteFile],
        message: &str,
        head: &CommitRef,
    ) -> Result<String, RemoteError> {
        let mut entries = Vec::with_capacity(batch.len());
        for file in batch {
            let blob_sha = self.client.create_blob(repo, &file.content).await?;
            entries.push(TreeEntry {
                path: file.path.clone(),
                mode: file.mode.clone(),
                sha: blob_sha,
            });
        }

        let tree_sha = self
            .client
            .create_tree(repo, Some(&head.tree_sha), &entries)
            .await?;
        let commit_sha = self
            .client
            .create_commit(repo, message, &tree_sha, &[head.sha.clone()])
            .await?;
        self.client.update_ref(repo, branch, &commit_sha).await?;
        Ok(commit_sha)
    }

    /// Per-file fallback for one failed batch; each file retries on its own.
    async fn publish_sequential(
        &self,
        repo: &str,
        branch: &str,
        batch: &[RemoteFile],
        report: &mut PublishReport,
    ) {
        for file in batch {
            let message = file
                .message
                .clone()
                .unwrap_or_else(|| format!("Add {}", file.path));
            for attempt in 0..self.retry.max_attempts {
                match self
                    .client
                    .upload_file(repo, branch, &file.path, &file.content, &message)
                    .await
                {
                    Ok(commit_sha) => {
                        report.success += 1;
                        report.commit_refs.push(commit_sha);
                        break;
                    }
                    Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts => {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push(format!("{}: {}", file.path, e));
                        break;
                    }
                }
            }
        }
    }
}

/// Commit message policy: a message shared by every file wins, otherwise
/// the upload summary.
fn commit_message(files: &[RemoteFile], fallback: Option<&str>) -> String {
    let mut shared: Option<&str> = None;
    let mut uniform = true;
    for file in files {
        match (&file.message, shared) {
            (Some(message), None) => shared = Some(message),
            (Some(message), Some(seen)) if message == seen => {}
            _ => {
                uniform = false;
                break;
            }
        }
    }
    if uniform {
        if let Some(message) = shared {
            return message.to_string();
        }
    }
    fallback
        .map(str::to_string)
        .unwrap_or_else(|| format!("Upload {} files via Kickstorm", files.len()))
}
