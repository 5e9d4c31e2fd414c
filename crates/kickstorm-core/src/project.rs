//! Thin interface to the external project system.
//!
//! Accounts, project CRUD, and membership live outside this pipeline. The
//! handlers only need to resolve a project and check membership, and the
//! publisher needs to read and write back the canonical remote repo name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// The slice of a project this pipeline consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Canonical name of the remote repository, once created.
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub private: bool,
    pub creator_id: i64,
    #[serde(default)]
    pub members: Vec<i64>,
}

impl ProjectInfo {
    pub fn is_member(&self, user_id: i64) -> bool {
        self.creator_id == user_id || self.members.contains(&user_id)
    }
}

/// Lookup surface consulted by every request handler and by the publisher.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn find(&self, project_id: i64) -> Option<ProjectInfo>;

    async fn is_member(&self, project_id: i64, user_id: i64) -> bool {
        match self.find(project_id).await {
            Some(project) => project.is_member(user_id),
            None => false,
        }
    }

    /// Record the canonical repo name after create-or-get on the remote.
    async fn set_repo_name(&self, project_id: i64, repo_name: &str);
}

/// In-process directory loaded from a JSON file at startup.
pub struct StaticProjectDirectory {
    projects: RwLock<HashMap<i64, ProjectInfo>>,
}

impl StaticProjectDirectory {
    pub fn new(projects: Vec<ProjectInfo>) -> Self {
        let map = projects.into_iter().map(|p| (p.project_id, p)).collect();
        Self {
            projects: RwLock::new(map),
        }
    }

    /// Load the directory from a JSON array of `ProjectInfo` documents.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let projects: Vec<ProjectInfo> = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            count = projects.len(),
            "Loaded project directory"
        );
        Ok(Self::new(projects))
    }
}

#[async_trait]
impl ProjectDirectory for StaticProjectDirectory {
    async fn find(&self, project_id: i64) -> Option<ProjectInfo> {
        self.projects
            .read()
            .ok()
            .and_then(|map| map.get(&project_id).cloned())
    }

    async fn set_repo_name(&self, project_id: i64, repo_name: &str) {
        if let Ok(mut map) = self.projects.write() {
            if let Some(project) = map.get_mut(&project_id) {
                project.repo_name = Some(repo_name.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProjectInfo {
        ProjectInfo {
            project_id: 1,
            name: "demo".into(),
            description: None,
            repo_name: None,
            private: false,
            creator_id: 10,
            members: vec![11, 12],
        }
    }

    #[tokio::test]
    async fn test_membership() {
        let dir = StaticProjectDirectory::new(vec![sample()]);
        assert!(dir.is_member(1, 10).await);
        assert!(dir.is_member(1, 11).await);
        assert!(!dir.is_member(1, 99).await);
        assert!(!dir.is_member(2, 10).await);
    }

    #[tokio::test]
    async fn test_set_repo_name() {
        let dir = StaticProjectDirectory::new(vec![sample()]);
        dir.set_repo_name(1, "org/project-1-demo").await;
        let project = dir.find(1).await.unwrap();
        assert_eq!(project.repo_name.as_deref(), Some("org/project-1-demo"));
    }
}
