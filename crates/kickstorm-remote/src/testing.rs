//! In-memory remote repository for tests.
//!
//! Models just enough of the git data API to verify commit counts, tree
//! contents, fast-forward semantics, and failure handling without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{CommitRef, RemoteError, RemoteRepoClient, TreeEntry};

#[derive(Debug, Clone)]
struct Commit {
    sha: String,
    tree_sha: String,
    parents: Vec<String>,
    #[allow(dead_code)]
    message: String,
}

#[derive(Debug, Default)]
struct RepoState {
    /// branch -> ordered commits, last is the head.
    branches: HashMap<String, Vec<Commit>>,
    blobs: HashMap<String, Vec<u8>>,
    /// tree sha -> path -> blob sha.
    trees: HashMap<String, HashMap<String, String>>,
    /// commits created but not yet referenced by a branch.
    pending: HashMap<String, Commit>,
}

#[derive(Debug, Default)]
struct State {
    repos: HashMap<String, RepoState>,
    counter: u64,
}

#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<State>,
    owner: String,
    fail_tree_creates: AtomicUsize,
    fail_uploads: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            owner: "kickstorm".to_string(),
            fail_tree_creates: AtomicUsize::new(0),
            fail_uploads: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` tree creations fail with a transient error.
    pub fn fail_next_tree_creates(&self, n: usize) {
        self.fail_tree_creates.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` contents-API uploads fail with a transient error.
    pub fn fail_next_uploads(&self, n: usize) {
        self.fail_uploads.store(n, Ordering::SeqCst);
    }

    pub fn commit_count(&self, repo: &str, branch: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .repos
            .get(repo)
            .and_then(|r| r.branches.get(branch))
            .map(|commits| commits.len())
            .unwrap_or(0)
    }

    /// File content at the branch head, if present.
    pub fn file_at_head(&self, repo: &str, branch: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let repo_state = state.repos.get(repo)?;
        let head = repo_state.branches.get(branch)?.last()?;
        let tree = repo_state.trees.get(&head.tree_sha)?;
        let blob_sha = tree.get(path)?;
        repo_state.blobs.get(blob_sha).cloned()
    }

    pub fn files_at_head(&self, repo: &str, branch: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut paths: Vec<String> = state
            .repos
            .get(repo)
            .and_then(|r| {
                let head = r.branches.get(branch)?.last()?;
                r.trees.get(&head.tree_sha).map(|t| t.keys().cloned().collect())
            })
            .unwrap_or_default();
        paths.sort();
        paths
    }

    fn next_sha(state: &mut State, prefix: &str) -> String {
        state.counter += 1;
        format!("{}{:08x}", prefix, state.counter)
    }

    fn consume(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteRepoClient for MemoryRemote {
    async fn ensure_repo(
        &self,
        name: &str,
        _description: &str,
        _private: bool,
    ) -> Result<String, RemoteError> {
        let full_name = format!("{}/{}", self.owner, name);
        let mut state = self.state.lock().unwrap();
        if !state.repos.contains_key(&full_name) {
            // auto_init: an empty root commit on the default branch.
            let tree_sha = Self::next_sha(&mut state, "tree");
            let commit_sha = Self::next_sha(&mut state, "commit");
            let mut repo = RepoState::default();
            repo.trees.insert(tree_sha.clone(), HashMap::new());
            repo.branches.insert(
                "main".to_string(),
                vec![Commit {
                    sha: commit_sha,
                    tree_sha,
                    parents: Vec::new(),
                    message: "Initial commit".to_string(),
                }],
            );
            state.repos.insert(full_name.clone(), repo);
        }
        Ok(full_name)
    }

    async fn branch_head(&self, repo: &str, branch: &str) -> Result<CommitRef, RemoteError> {
        let state = self.state.lock().unwrap();
        let head = state
            .repos
            .get(repo)
            .ok_or_else(|| RemoteError::Permanent(format!("no such repo: {}", repo)))?
            .branches
            .get(branch)
            .and_then(|commits| commits.last())
            .ok_or_else(|| RemoteError::BranchMissing(branch.to_string()))?;
        Ok(CommitRef {
            sha: head.sha.clone(),
            tree_sha: head.tree_sha.clone(),
        })
    }

    async fn create_blob(&self, repo: &str, content: &[u8]) -> Result<String, RemoteError> {
        let mut state = self.state.lock().unwrap();
        let sha = Self::next_sha(&mut state, "blob");
        let repo_state = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| RemoteError::Permanent(format!("no such repo: {}", repo)))?;
        repo_state.blobs.insert(sha.clone(), content.to_vec());
        Ok(sha)
    }

    async fn create_tree(
        &self,
        repo: &str,
        base_tree: Option<&str>,
        entries: &[TreeEntry],
    ) -> Result<String, RemoteError> {
        if Self::consume(&self.fail_tree_creates) {
            return Err(RemoteError::Transient("injected tree failure".to_string()));
        }
        if entries.len() > crate::batch::TREE_BATCH_LIMIT {
            return Err(RemoteError::Permanent(format!(
                "tree request of {} entries exceeds the cap",
                entries.len()
            )));
        }

        let mut state = self.state.lock().unwrap();
        let sha = Self::next_sha(&mut state, "tree");
        let repo_state = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| RemoteError::Permanent(format!("no such repo: {}", repo)))?;

        let mut tree = match base_tree {
            Some(base) => repo_state
                .trees
                .get(base)
                .cloned()
                .ok_or_else(|| RemoteError::Permanent(format!("no such tree: {}", base)))?,
            None => HashMap::new(),
        };
        for entry in entries {
            tree.insert(entry.path.clone(), entry.sha.clone());
        }
        repo_state.trees.insert(sha.clone(), tree);
        Ok(sha)
    }

    async fn create_commit(
        &self,
        repo: &str,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<String, RemoteError> {
        let mut state = self.state.lock().unwrap();
        let sha = Self::next_sha(&mut state, "commit");
        let repo_state = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| RemoteError::Permanent(format!("no such repo: {}", repo)))?;
        repo_state.pending.insert(
            sha.clone(),
            Commit {
                sha: sha.clone(),
                tree_sha: tree_sha.to_string(),
                parents: parents.to_vec(),
                message: message.to_string(),
            },
        );
        Ok(sha)
    }

    async fn update_ref(&self, repo: &str, branch: &str, sha: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        let repo_state = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| RemoteError::Permanent(format!("no such repo: {}", repo)))?;
        let commit = repo_state
            .pending
            .remove(sha)
            .ok_or_else(|| RemoteError::Permanent(format!("no such commit: {}", sha)))?;
        let commits = repo_state
            .branches
            .get_mut(branch)
            .ok_or_else(|| RemoteError::BranchMissing(branch.to_string()))?;
        // Fast-forward only: the new commit must descend from the head.
        let head_sha = commits.last().map(|c| c.sha.clone()).unwrap_or_default();
        if commit.parents.first() != Some(&head_sha) {
            return Err(RemoteError::RefConflict(format!(
                "expected parent {}, head is {}",
                commit.parents.first().cloned().unwrap_or_default(),
                head_sha
            )));
        }
        commits.push(commit);
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
        if Self::consume(&self.fail_uploads) {
            return Err(RemoteError::Transient("injected upload failure".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        let blob_sha = Self::next_sha(&mut state, "blob");
        let tree_sha = Self::next_sha(&mut state, "tree");
        let commit_sha = Self::next_sha(&mut state, "commit");
        let repo_state = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| RemoteError::Permanent(format!("no such repo: {}", repo)))?;

        let head = repo_state
            .branches
            .get(branch)
            .and_then(|commits| commits.last())
            .cloned()
            .ok_or_else(|| RemoteError::BranchMissing(branch.to_string()))?;

        let mut tree = repo_state
            .trees
            .get(&head.tree_sha)
            .cloned()
            .unwrap_or_default();
        repo_state.blobs.insert(blob_sha.clone(), content.to_vec());
        tree.insert(path.to_string(), blob_sha);
        repo_state.trees.insert(tree_sha.clone(), tree);

        let commit = Commit {
            sha: commit_sha.clone(),
            tree_sha,
            parents: vec![head.sha],
            message: message.to_string(),
        };
        repo_state
            .branches
            .get_mut(branch)
            .expect("branch checked above")
            .push(commit);
        Ok(commit_sha)
    }
}
