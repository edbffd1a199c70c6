//! Wire schema for one line of a session log.
//!
//! Every field except `uuid` is optional on disk; deserialization is
//! tolerant so a single malformed field never loses the record.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawRecord {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// ISO-8601 string, epoch seconds, or epoch milliseconds.
    #[serde(default)]
    pub timestamp: Value,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub git_branch: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub is_meta: bool,
    #[serde(default)]
    pub is_sidechain: bool,
    #[serde(default)]
    pub is_compact_summary: bool,
    #[serde(default)]
    pub tool_use_result: Value,
    #[serde(default)]
    pub message: RawMessage,
}

// The message body keeps the API's snake_case keys, unlike the record
// envelope
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub model: String,
    /// String or array of content blocks, converted by the parser.
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Kept as a raw value; a malformed usage object must not lose the
    /// whole record.
    #[serde(default)]
    pub usage: Value,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
}
