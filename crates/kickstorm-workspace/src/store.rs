//! Workspace store: directory layout, atomic metadata, history, recovery.
//!
//! All filesystem work here is small and synchronous; requests are allowed
//! to block on workspace I/O. Metadata writes go through a temp file in the
//! session directory, fsync, then an atomic rename, so concurrent readers
//! always observe a consistent prior document.

use chrono::{Duration, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use kickstorm_core::models::{HistoryEntry, RepoFile, SessionStatus, UploadSession};
use kickstorm_core::paths;

const METADATA_FILE: &str = "metadata.json";
const HISTORY_FILE: &str = "history.json";
const INCOMING_DIR: &str = "incoming";
const REPO_DIR: &str = "repo";

/// Reason written to sessions released by the recovery sweep.
const STUCK_RECOVERY_REASON: &str = "sync timeout - stuck session recovered automatically";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata is not valid JSON: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is protected: {0}")]
    Protected(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl WorkspaceError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Per-project workspace directories and session documents.
#[derive(Clone, Debug)]
pub struct WorkspaceStore {
    root: PathBuf,
    stuck_after: Duration,
    history_limit: usize,
}

impl WorkspaceStore {
    pub fn new(root: impl Into<PathBuf>, stuck_after_seconds: u64, history_limit: usize) -> Self {
        Self {
            root: root.into(),
            stuck_after: Duration::seconds(stuck_after_seconds as i64),
            history_limit,
        }
    }

    /// Session identifiers come from URLs; only the hex alphabet the
    /// generator emits is accepted, which also rules out traversal.
    pub fn validate_session_id(session_id: &str) -> Result<(), WorkspaceError> {
        let ok = !session_id.is_empty()
            && session_id.len() <= 64
            && session_id.chars().all(|c| c.is_ascii_hexdigit());
        if ok {
            Ok(())
        } else {
            Err(WorkspaceError::InvalidPath(format!(
                "invalid session id: {}",
                session_id
            )))
        }
    }

    pub fn project_dir(&self, project_id: i64) -> PathBuf {
        self.root.join(project_id.to_string())
    }

    /// Create the project workspace skeleton if missing.
    pub fn ensure_project(&self, project_id: i64) -> Result<PathBuf, WorkspaceError> {
        let workspace = self.project_dir(project_id);
        let incoming = workspace.join(INCOMING_DIR);
        fs::create_dir_all(&incoming).map_err(|e| WorkspaceError::io(&incoming, e))?;
        Ok(workspace)
    }

    /// Session directory, created on first use.
    pub fn session_dir(
        &self,
        project_id: i64,
        session_id: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        Self::validate_session_id(session_id)?;
        let dir = self
            .ensure_project(project_id)?
            .join(INCOMING_DIR)
            .join(session_id);
        fs::create_dir_all(&dir).map_err(|e| WorkspaceError::io(&dir, e))?;
        Ok(dir)
    }

    /// Session directory only if it already exists.
    pub fn existing_session_dir(
        &self,
        project_id: i64,
        session_id: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        Self::validate_session_id(session_id)?;
        let dir = self
            .project_dir(project_id)
            .join(INCOMING_DIR)
            .join(session_id);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(WorkspaceError::SessionNotFound(session_id.to_string()))
        }
    }

    pub fn repo_dir(&self, project_id: i64) -> Result<PathBuf, WorkspaceError> {
        let dir = self.ensure_project(project_id)?.join(REPO_DIR);
        fs::create_dir_all(&dir).map_err(|e| WorkspaceError::io(&dir, e))?;
        Ok(dir)
    }

    pub fn metadata_path(session_dir: &Path) -> PathBuf {
        session_dir.join(METADATA_FILE)
    }

    pub fn load_metadata(
        &self,
        session_dir: &Path,
    ) -> Result<Option<UploadSession>, WorkspaceError> {
        let path = Self::metadata_path(session_dir);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| WorkspaceError::io(&path, e))?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Atomic write: temp file in the same directory, fsync, rename over.
    /// An unflushed write must never be observable as a half-written
    /// document; the recovery sweep is the backstop for anything that never
    /// lands at all.
    pub fn save_metadata(
        &self,
        session_dir: &Path,
        session: &UploadSession,
    ) -> Result<(), WorkspaceError> {
        fs::create_dir_all(session_dir).map_err(|e| WorkspaceError::io(session_dir, e))?;
        let path = Self::metadata_path(session_dir);
        let body = serde_json::to_vec_pretty(session)?;

        let mut tmp =
            NamedTempFile::new_in(session_dir).map_err(|e| WorkspaceError::io(session_dir, e))?;
        tmp.write_all(&body)
            .map_err(|e| WorkspaceError::io(&path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| WorkspaceError::io(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| WorkspaceError::io(&path, e.error))?;

        tracing::debug!(
            session_id = %session.session_id,
            status = %session.status,
            path = %path.display(),
            "Session metadata saved"
        );
        Ok(())
    }

    /// List sessions for a project, newest first, running the stale-sync
    /// recovery sweep over every entry it reads. Sessions found `syncing`
    /// with an `updated_at` older than the stuck threshold are rewritten to
    /// `error` in place; the sweep is idempotent and safe to run while a
    /// real worker is active because the worker re-reads state before it
    /// writes `completed`.
    pub fn list_sessions(
        &self,
        project_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<UploadSession>, WorkspaceError> {
        let incoming = self.project_dir(project_id).join(INCOMING_DIR);
        if !incoming.is_dir() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        let entries = fs::read_dir(&incoming).map_err(|e| WorkspaceError::io(&incoming, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| WorkspaceError::io(&incoming, e))?;
            let session_path = entry.path();
            if !session_path.is_dir() {
                continue;
            }
            let mut session = match self.load_metadata(&session_path) {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        path = %session_path.display(),
                        error = %e,
                        "Skipping unreadable session metadata"
                    );
                    continue;
                }
            };

            if self.recover_if_stuck(&session_path, &mut session)? {
                tracing::warn!(
                    session_id = %session.session_id,
                    project_id = project_id,
                    "Session auto-recovered from stuck syncing state"
                );
            }

            sessions.push(session);
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    /// Load one session by id, applying the same recovery sweep.
    pub fn load_session(
        &self,
        project_id: i64,
        session_id: &str,
    ) -> Result<UploadSession, WorkspaceError> {
        let dir = self.existing_session_dir(project_id, session_id)?;
        let mut session = self
            .load_metadata(&dir)?
            .ok_or_else(|| WorkspaceError::SessionNotFound(session_id.to_string()))?;
        self.recover_if_stuck(&dir, &mut session)?;
        Ok(session)
    }

    fn recover_if_stuck(
        &self,
        session_dir: &Path,
        session: &mut UploadSession,
    ) -> Result<bool, WorkspaceError> {
        if session.status != SessionStatus::Syncing {
            return Ok(false);
        }
        let age = Utc::now() - session.updated_at;
        if age <= self.stuck_after {
            return Ok(false);
        }
        session.mark_error(STUCK_RECOVERY_REASON);
        session.recovered_at = Some(Utc::now());
        self.save_metadata(session_dir, session)?;
        Ok(true)
    }

    /// Delete a session directory. Refused while the session is protected
    /// (`completed` or `syncing`).
    pub fn delete_session(&self, project_id: i64, session_id: &str) -> Result<(), WorkspaceError> {
        let dir = self.existing_session_dir(project_id, session_id)?;
        if let Some(session) = self.load_metadata(&dir)? {
            if session.status.is_protected() {
                return Err(WorkspaceError::Protected(format!(
                    "session {} is {}",
                    session_id, session.status
                )));
            }
        }
        fs::remove_dir_all(&dir).map_err(|e| WorkspaceError::io(&dir, e))?;
        tracing::info!(
            project_id = project_id,
            session_id = %session_id,
            "Upload session deleted"
        );
        Ok(())
    }

    fn history_path(&self, project_id: i64) -> Result<PathBuf, WorkspaceError> {
        Ok(self.ensure_project(project_id)?.join(HISTORY_FILE))
    }

    pub fn load_history(
        &self,
        project_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>, WorkspaceError> {
        let path = self.history_path(project_id)?;
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).map_err(|e| WorkspaceError::io(&path, e))?;
        // A mangled history file must not break status reads.
        let mut entries: Vec<HistoryEntry> = serde_json::from_str(&raw).unwrap_or_default();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Prepend a history entry, truncating to the configured ring size.
    pub fn push_history(
        &self,
        project_id: i64,
        entry: HistoryEntry,
    ) -> Result<(), WorkspaceError> {
        let path = self.history_path(project_id)?;
        let mut entries = self.load_history(project_id, None)?;
        entries.insert(0, entry);
        entries.truncate(self.history_limit);

        let body = serde_json::to_vec_pretty(&entries)?;
        let parent = path.parent().unwrap_or_else(|| self.root.as_path());
        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        tmp.write_all(&body)
            .map_err(|e| WorkspaceError::io(&path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| WorkspaceError::io(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| WorkspaceError::io(&path, e.error))?;
        Ok(())
    }

    /// List the synced `repo/` tree.
    pub fn repo_files(
        &self,
        project_id: i64,
        limit: usize,
    ) -> Result<Vec<RepoFile>, WorkspaceError> {
        let repo = self.repo_dir(project_id)?;
        crate::tree::list_repo_files(&repo, limit)
    }

    /// Resolve a client-supplied path inside `repo/`, rejecting anything
    /// that escapes it.
    pub fn repo_file_path(
        &self,
        project_id: i64,
        relative_path: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let sanitized = paths::sanitize(relative_path)
            .map_err(|e| WorkspaceError::InvalidPath(e.to_string()))?;
        let repo = self.repo_dir(project_id)?;
        let absolute = repo.join(&sanitized);

        // Containment check on the resolved path; the sanitized form cannot
        // contain traversal segments, this guards symlinked components.
        if let Ok(canonical) = absolute.canonicalize() {
            let repo_canonical = repo
                .canonicalize()
                .map_err(|e| WorkspaceError::io(&repo, e))?;
            if !canonical.starts_with(&repo_canonical) {
                return Err(WorkspaceError::InvalidPath(format!(
                    "path escapes the repository tree: {}",
                    relative_path
                )));
            }
        }
        Ok(absolute)
    }

    /// Resolve a staged file inside a session directory.
    pub fn staged_file_path(
        &self,
        session_dir: &Path,
        relative_path: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let sanitized = paths::sanitize(relative_path)
            .map_err(|e| WorkspaceError::InvalidPath(e.to_string()))?;
        Ok(session_dir.join(sanitized))
    }

    /// Mirror a session's accepted files into `repo/`. Only invoked after a
    /// successful remote publish, so `repo/` tracks the last published
    /// snapshot.
    pub fn mirror_session(
        &self,
        project_id: i64,
        session_dir: &Path,
        accepted: &[String],
    ) -> Result<usize, WorkspaceError> {
        let repo = self.repo_dir(project_id)?;
        let mut copied = 0usize;
        for rel in accepted {
            let source = session_dir.join(rel);
            if !source.is_file() {
                tracing::warn!(path = %rel, "Staged file missing during mirror, skipping");
                continue;
            }
            let dest = repo.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
            }
            fs::copy(&source, &dest).map_err(|e| WorkspaceError::io(&dest, e))?;
            copied += 1;
        }
        tracing::debug!(
            project_id = project_id,
            copied = copied,
            "Session files mirrored into repo tree"
        );
        Ok(copied)
    }

    /// Collect the session's staged files (relative path, absolute path),
    /// sorted by path. `metadata.json` is never part of the file set.
    pub fn collect_staged_files(
        &self,
        session_dir: &Path,
    ) -> Result<Vec<(String, PathBuf)>, WorkspaceError> {
        let mut files = Vec::new();
        collect_files_recursive(session_dir, session_dir, &mut files)?;
        files.retain(|(rel, _)| rel != METADATA_FILE);
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

fn collect_files_recursive(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, PathBuf)>,
) -> Result<(), WorkspaceError> {
    let entries = fs::read_dir(dir).map_err(|e| WorkspaceError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| WorkspaceError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(root, &path, out)?;
        } else if path.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((rel, path));
            }
        }
    }
    Ok(())
}
