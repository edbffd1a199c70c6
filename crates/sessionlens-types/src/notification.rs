use serde::{Deserialize, Serialize};

/// A pattern or threshold rule evaluated against newly-appended records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTrigger {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Regex pattern; empty disables pattern matching for this trigger.
    #[serde(default)]
    pub pattern: String,
    /// Roles whose text is matchable; empty means no role filter.
    #[serde(default)]
    pub match_roles: Vec<String>,
    #[serde(default)]
    pub color: String,
    /// Fires when an assistant record's output tokens reach this value;
    /// 0 disables the threshold.
    #[serde(default)]
    pub token_threshold: u64,
    #[serde(default)]
    pub match_errors: bool,
}

fn default_enabled() -> bool {
    true
}

/// One fired notification, kept in the ring-buffered history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    pub id: String,
    pub trigger_id: String,
    pub trigger_name: String,
    pub trigger_color: String,
    pub matched_text: String,
    pub file_path: String,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
}

/// One match from a project-name or session-content search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub session_id: String,
    pub project_id: String,
    pub session_title: String,
    pub matched_text: String,
    /// Matched text with up to 50 characters of context on each side.
    pub context: String,
    pub message_type: String,
    /// Epoch seconds.
    pub timestamp: f64,
    pub message_index: usize,
}
