use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{SessionStatus, UploadKind};

/// Append-once record written to the head of `history.json` when a session
/// reaches a terminal state. The list is truncated to the most recent
/// entries (20 by default).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(rename = "type")]
    pub kind: UploadKind,
    pub created_at: DateTime<Utc>,
    pub file_count: usize,
    pub total_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
