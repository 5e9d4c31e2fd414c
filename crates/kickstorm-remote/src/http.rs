//! HTTP implementation of the remote repository client against a
//! GitHub-style REST API (repos, branches, and the git data endpoints).

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::client::{CommitRef, RemoteError, RemoteRepoClient, TreeEntry};

const HTTP_TIMEOUT_SECS: u64 = 60;

pub struct HttpRemoteClient {
    http: reqwest::Client,
    api_base: String,
    owner: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    sha: String,
    commit: BranchCommitInner,
}

#[derive(Debug, Deserialize)]
struct BranchCommitInner {
    tree: ShaRef,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    commit: ShaRef,
}

#[derive(Debug, Deserialize)]
struct ExistingContent {
    sha: String,
}

impl HttpRemoteClient {
    pub fn new(api_base: &str, token: &str, owner: &str) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("token {}", token))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("kickstorm-workspace-sync"),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Map transport and status failures onto the transient/permanent split.
    async fn check(
        &self,
        result: Result<reqwest::Response, reqwest::Error>,
        what: &str,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = result.map_err(|e| RemoteError::Transient(format!("{}: {}", what, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("{}: {} {}", what, status, body);
        if status.is_server_error() {
            Err(RemoteError::Transient(message))
        } else if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            Err(RemoteError::RefConflict(message))
        } else {
            Err(RemoteError::Permanent(message))
        }
    }
}

#[async_trait]
impl RemoteRepoClient for HttpRemoteClient {
    async fn ensure_repo(
        &self,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<String, RemoteError> {
        // Create-or-get: probe first, create on 404.
        let probe = self
            .http
            .get(self.url(&format!("repos/{}/{}", self.owner, name)))
            .send()
            .await
            .map_err(|e| RemoteError::Transient(format!("get repo: {}", e)))?;

        match probe.status() {
            status if status.is_success() => {
                let repo: RepoResponse = probe
                    .json()
                    .await
                    .map_err(|e| RemoteError::Transient(format!("get repo body: {}", e)))?;
                return Ok(repo.full_name);
            }
            StatusCode::NOT_FOUND => {}
            status if status.is_server_error() => {
                return Err(RemoteError::Transient(format!("get repo: {}", status)));
            }
            status => {
                return Err(RemoteError::Permanent(format!("get repo: {}", status)));
            }
        }

        let payload = json!({
            "name": name,
            "description": description,
            "private": private,
            "auto_init": true,
        });

        // Organization owners create under /orgs; user accounts under /user.
        let org_attempt = self
            .http
            .post(self.url(&format!("orgs/{}/repos", self.owner)))
            .json(&payload)
            .send()
            .await;
        let org_missing = matches!(&org_attempt, Ok(r) if r.status() == StatusCode::NOT_FOUND);
        let response = if org_missing {
            self.http
                .post(self.url("user/repos"))
                .json(&payload)
                .send()
                .await
        } else {
            org_attempt
        };

        let response = self.check(response, "create repo").await?;
        let repo: RepoResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Transient(format!("create repo body: {}", e)))?;

        tracing::info!(repo = %repo.full_name, "Created remote repository");
        Ok(repo.full_name)
    }

    async fn branch_head(&self, repo: &str, branch: &str) -> Result<CommitRef, RemoteError> {
        let response = self
            .http
            .get(self.url(&format!("repos/{}/branches/{}", repo, branch)))
            .send()
            .await
            .map_err(|e| RemoteError::Transient(format!("branch head: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RemoteError::BranchMissing(branch.to_string()));
        }
        let response = self.check(Ok(response), "branch head").await?;
        let branch_info: BranchResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Transient(format!("branch head body: {}", e)))?;

        Ok(CommitRef {
            sha: branch_info.commit.sha,
            tree_sha: branch_info.commit.commit.tree.sha,
        })
    }

    async fn create_blob(&self, repo: &str, content: &[u8]) -> Result<String, RemoteError> {
        let payload = json!({
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "encoding": "base64",
        });
        let response = self
            .http
            .post(self.url(&format!("repos/{}/git/blobs", repo)))
            .json(&payload)
            .send()
            .await;
        let response = self.check(response, "create blob").await?;
        let blob: ShaRef = response
            .json()
            .await
            .map_err(|e| RemoteError::Transient(format!("create blob body: {}", e)))?;
        Ok(blob.sha)
    }

    async fn create_tree(
        &self,
        repo: &str,
        base_tree: Option<&str>,
        entries: &[TreeEntry],
    ) -> Result<String, RemoteError> {
        let tree: Vec<_> = entries
            .iter()
            .map(|e| {
                json!({
                    "path": e.path,
                    "mode": e.mode,
                    "type": "blob",
                    "sha": e.sha,
                })
            })
            .collect();
        let mut payload = json!({ "tree": tree });
        if let Some(base) = base_tree {
            payload["base_tree"] = json!(base);
        }

        let response = self
            .http
            .post(self.url(&format!("repos/{}/git/trees", repo)))
            .json(&payload)
            .send()
            .await;
        let response = self.check(response, "create tree").await?;
        let tree: ShaRef = response
            .json()
            .await
            .map_err(|e| RemoteError::Transient(format!("create tree body: {}", e)))?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, RemoteError> {
        let payload = json!({
            "message": message,
            "tree": tree_sha,
            "parents": parents,
        });
        let response = self
            .http
            .post(self.url(&format!("repos/{}/git/commits", repo)))
            .json(&payload)
            .send()
            .await;
        let response = self.check(response, "create commit").await?;
        let commit: ShaRef = response
            .json()
            .await
            .map_err(|e| RemoteError::Transient(format!("create commit body: {}", e)))?;
        Ok(commit.sha)
    }

    async fn update_ref(&self, repo: &str, branch: &str, sha: &str) -> Result<(), RemoteError> {
        let payload = json!({ "sha": sha, "force": false });
        let response = self
            .http
            .patch(self.url(&format!("repos/{}/git/refs/heads/{}", repo, branch)))
            .json(&payload)
            .send()
            .await;
        self.check(response, "update ref").await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        repo: &str,
        branch: &str,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<String, RemoteError> {
        // The contents API requires the current blob sha when replacing.
        let existing = self
            .http
            .get(self.url(&format!("repos/{}/contents/{}", repo, path)))
            .query(&[("ref", branch)])
            .send()
            .await
            .map_err(|e| RemoteError::Transient(format!("get contents: {}", e)))?;
        let existing_sha = if existing.status().is_success() {
            existing
                .json::<ExistingContent>()
                .await
                .ok()
                .map(|c| c.sha)
        } else {
            None
        };

        let mut payload = json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
            "branch": branch,
        });
        if let Some(sha) = existing_sha {
            payload["sha"] = json!(sha);
        }

        let response = self
            .http
            .put(self.url(&format!("repos/{}/contents/{}", repo, path)))
            .json(&payload)
            .send()
            .await;
        let response = self.check(response, "upload file").await?;
        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Transient(format!("upload file body: {}", e)))?;
        Ok(contents.commit.sha)
    }
}
