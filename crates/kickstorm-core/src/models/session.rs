use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Upload session lifecycle.
///
/// ```text
/// pending ──(first chunk or archive accepted)──▶ in_progress
/// in_progress ──(archive fully extracted)──▶ extracted
/// in_progress ──(finalize)──▶ ready
/// extracted ──(finalize, implicit on the zip path)──▶ ready
/// ready ──(dispatch sync)──▶ syncing
/// syncing ──(remote publish ok)──▶ completed
/// syncing ──(remote publish fail | stuck > threshold)──▶ error
/// ```
///
/// `completed` and `error` are terminal. Transitions are monotonic except
/// the stuck-session recovery edge from `syncing` to `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Extracted,
    Ready,
    Syncing,
    Completed,
    Error,
}

impl SessionStatus {
    /// Sessions in these states cannot be cancelled or deleted by clients.
    pub fn is_protected(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Syncing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }

    /// Whether `next` is a legal successor of `self` in the state diagram.
    /// The auto-recovery edge (`syncing -> error`) is part of the diagram.
    pub fn allows_transition(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Extracted)
                | (InProgress, Extracted)
                | (InProgress, Ready)
                | (InProgress, Error)
                | (Extracted, Ready)
                | (Extracted, Syncing)
                | (Ready, Syncing)
                | (Syncing, Completed)
                | (Syncing, Error)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Extracted => "extracted",
            SessionStatus::Ready => "ready",
            SessionStatus::Syncing => "syncing",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// How the session's files arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Zip,
    Manual,
}

/// Completion state of one staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileEntryStatus {
    Pending,
    Complete,
}

/// One staged file inside a session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionFile {
    pub path: String,
    pub size: u64,
    pub status: FileEntryStatus,
    pub updated_at: DateTime<Utc>,
}

/// How a session was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncMethod {
    Git,
    Async,
}

/// Persistent state of one upload session, stored as `metadata.json` in the
/// session directory. Invariants: `file_count == files.len()`,
/// `total_size == Σ files[i].size`, `updated_at >= created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadSession {
    pub session_id: String,
    pub project_id: i64,
    #[serde(rename = "type")]
    pub kind: UploadKind,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<i64>,
    pub file_count: usize,
    pub total_size: u64,
    pub files: Vec<SessionFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_method: Option<SyncMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn new(session_id: String, project_id: i64, kind: UploadKind) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            project_id,
            kind,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
            finalized_at: None,
            sync_finished_at: None,
            initiated_by: None,
            file_count: 0,
            total_size: 0,
            files: Vec::new(),
            sync_method: None,
            sync_task_id: None,
            error: None,
            recovered_at: None,
        }
    }

    /// Generate a random URL-safe session identifier (128 bits, hex).
    pub fn generate_id() -> String {
        let mut bytes = [0u8; 16];
        rand::fill(&mut bytes);
        hex::encode(bytes)
    }

    /// Insert or update a file entry, keeping the derived counters
    /// consistent with the `files` list.
    pub fn upsert_file(&mut self, path: &str, size: u64, status: FileEntryStatus) {
        let now = Utc::now();
        match self.files.iter_mut().find(|f| f.path == path) {
            Some(existing) => {
                existing.size = size;
                existing.status = status;
                existing.updated_at = now;
            }
            None => self.files.push(SessionFile {
                path: path.to_string(),
                size,
                status,
                updated_at: now,
            }),
        }
        self.file_count = self.files.len();
        self.total_size = self.files.iter().map(|f| f.size).sum();
        self.updated_at = now;
    }

    /// Move to a new status, stamping `updated_at`. Callers are responsible
    /// for only requesting legal transitions; this asserts nothing so the
    /// recovery sweep can force `error` from any snapshot it finds on disk.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.status = SessionStatus::Error;
        self.error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    pub fn counters_consistent(&self) -> bool {
        self.file_count == self.files.len()
            && self.total_size == self.files.iter().map(|f| f.size).sum::<u64>()
            && self.updated_at >= self.created_at
    }
}
