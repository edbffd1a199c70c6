use serde::{Deserialize, Serialize};

/// A directory of sessions, named by a codec-encoded filesystem path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Encoded directory name, e.g. `-home-wiz-AI-LLM`.
    pub id: String,
    /// Decoded filesystem path.
    pub path: String,
    /// Last path segment, used for display and name search.
    pub name: String,
    pub session_count: usize,
}

/// Lightweight summary of one conversation log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// File stem of the `.jsonl` session file.
    pub id: String,
    pub project_id: String,
    /// Decoded project path, derived at runtime and never cached.
    pub project_path: String,
    pub file_path: String,
    pub file_size: u64,
    /// Epoch seconds.
    pub created_at: f64,
    /// Epoch seconds; staleness compares this at millisecond precision.
    pub modified_at: f64,
    pub first_message: String,
    pub message_count: u64,
    /// Runtime-only: derived from file-write recency, never restored from
    /// the cache.
    pub is_ongoing: bool,
    pub git_branch: String,
}
