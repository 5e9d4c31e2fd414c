//! Session publisher: repository naming, create-or-get, batch publish.

use std::sync::Arc;

use kickstorm_core::models::PublishReport;
use kickstorm_core::{ProjectDirectory, ProjectInfo};

use crate::batch::{BatchCommitBuilder, RetryPolicy};
use crate::client::{RemoteError, RemoteFile, RemoteRepoClient};

/// Publishes session file sets to the project's remote repository,
/// creating the repository on first use and recording the canonical name
/// back in the project record.
#[derive(Clone)]
pub struct RemotePublisher {
    client: Arc<dyn RemoteRepoClient>,
    branch: String,
    default_private: bool,
    retry: RetryPolicy,
}

impl RemotePublisher {
    pub fn new(client: Arc<dyn RemoteRepoClient>, branch: &str, default_private: bool) -> Self {
        Self {
            client,
            branch: branch.to_string(),
            default_private,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Publish `files` for `project` as one logical commit. Ensures the
    /// remote repository exists first and stores the canonical name back
    /// through the project directory.
    pub async fn publish(
        &self,
        project: &ProjectInfo,
        directory: &dyn ProjectDirectory,
        files: Vec<RemoteFile>,
        message: Option<&str>,
    ) -> Result<PublishReport, RemoteError> {
        let repo_name = match &project.repo_name {
            Some(name) => name.clone(),
            None => {
                let name = repo_name_for(project);
                let description = project
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("{} | managed via Kickstorm", project.name));
                let private = project.private || self.default_private;
                let full_name = self
                    .client
                    .ensure_repo(&name, &description, private)
                    .await?;
                directory.set_repo_name(project.project_id, &full_name).await;
                full_name
            }
        };

        tracing::info!(
            project_id = project.project_id,
            repo = %repo_name,
            files = files.len(),
            "Publishing session to remote repository"
        );

        BatchCommitBuilder::with_retry(self.client.as_ref(), self.retry)
            .publish(&repo_name, &self.branch, files, message)
            .await
    }
}

fn repo_name_for(project: &ProjectInfo) -> String {
    format!(
        "project-{}-{}",
        project.project_id,
        sanitize_repo_name(&project.name)
    )
}

/// Restrict a project name to the remote's repository-name alphabet.
pub fn sanitize_repo_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out.truncate(80);
        out
    }
}
