use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record kind as written by the agent CLI. Unknown kinds map to `System`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    User,
    Assistant,
    System,
    Summary,
    FileHistorySnapshot,
    QueueOperation,
}

impl RecordKind {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "user" => RecordKind::User,
            "assistant" => RecordKind::Assistant,
            "summary" => RecordKind::Summary,
            "file-history-snapshot" => RecordKind::FileHistorySnapshot,
            "queue-operation" => RecordKind::QueueOperation,
            _ => RecordKind::System,
        }
    }

    /// Pure bookkeeping kinds that never reach the display pipeline.
    pub fn is_hard_noise(self) -> bool {
        matches!(
            self,
            RecordKind::Summary | RecordKind::FileHistorySnapshot | RecordKind::QueueOperation
        )
    }
}

/// Token usage reported on an assistant record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_read_input_tokens
            + self.cache_creation_input_tokens
    }
}

/// A tool invocation issued by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    /// `description` input field, populated for Task invocations.
    #[serde(default)]
    pub task_description: String,
    /// `subagent_type` input field, populated for Task invocations.
    #[serde(default)]
    pub subagent_type: String,
}

impl ToolCall {
    pub fn is_task(&self) -> bool {
        self.name == "Task"
    }

    /// String value of an input field, empty when absent or non-string.
    pub fn input_str(&self, key: &str) -> &str {
        self.input.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

/// A tool result answering an invocation, matched by `tool_use_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_use_id: String,
    /// String or array of blocks, kept verbatim.
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Flatten result content to plain text (string content or nested text
    /// blocks).
    pub fn text(&self) -> String {
        flatten_result_content(&self.content)
    }
}

pub(crate) fn flatten_result_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let mut out = String::new();
            for item in items {
                match item {
                    Value::String(s) => out.push_str(s),
                    Value::Object(map) => {
                        if let Some(Value::String(text)) = map.get("text") {
                            out.push_str(text);
                        }
                    }
                    _ => {}
                }
            }
            out
        }
        _ => String::new(),
    }
}

/// One content block of a record. Unknown block types are preserved verbatim
/// so token estimation can still size them.
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: Value, is_error: bool },
    Other(Value),
}

impl ContentBlock {
    /// Build a block from a raw JSON value, keyed by its `type` field.
    /// Anything unrecognized is kept verbatim.
    pub fn from_value(value: Value) -> Self {
        let type_name = value.get("type").and_then(Value::as_str).unwrap_or("");
        match type_name {
            "text" => ContentBlock::Text {
                text: value.get("text").and_then(Value::as_str).unwrap_or("").to_string(),
            },
            "thinking" => ContentBlock::Thinking {
                thinking: value.get("thinking").and_then(Value::as_str).unwrap_or("").to_string(),
            },
            "tool_use" => ContentBlock::ToolUse {
                id: value.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
                name: value.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                input: value.get("input").cloned().unwrap_or(Value::Null),
            },
            "tool_result" => ContentBlock::ToolResult {
                tool_use_id: value
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                content: value.get("content").cloned().unwrap_or(Value::Null),
                is_error: value.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            },
            _ => ContentBlock::Other(value),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            ContentBlock::Text { text } => serde_json::json!({"type": "text", "text": text}),
            ContentBlock::Thinking { thinking } => {
                serde_json::json!({"type": "thinking", "thinking": thinking})
            }
            ContentBlock::ToolUse { id, name, input } => {
                serde_json::json!({"type": "tool_use", "id": id, "name": name, "input": input})
            }
            ContentBlock::ToolResult { tool_use_id, content, is_error } => serde_json::json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            }),
            ContentBlock::Other(value) => value.clone(),
        }
    }
}

// Manual serde impls: derive cannot express "tagged variants with a
// verbatim pass-through fallback" in one enum.
impl Serialize for ContentBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(ContentBlock::from_value(Value::deserialize(deserializer)?))
    }
}

/// Record content: either a bare string or an ordered block sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for RecordContent {
    fn default() -> Self {
        RecordContent::Text(String::new())
    }
}

impl RecordContent {
    /// Concatenated text of string content and `text` blocks, unsanitized.
    pub fn plain_text(&self) -> String {
        match self {
            RecordContent::Text(s) => s.clone(),
            RecordContent::Blocks(blocks) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                parts.join("\n")
            }
        }
    }

    /// Concatenated `thinking` block text.
    pub fn thinking_text(&self) -> String {
        match self {
            RecordContent::Text(_) => String::new(),
            RecordContent::Blocks(blocks) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Thinking { thinking } => Some(thinking.as_str()),
                        _ => None,
                    })
                    .collect();
                parts.join("\n\n")
            }
        }
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            RecordContent::Text(_) => &[],
            RecordContent::Blocks(blocks) => blocks,
        }
    }
}

/// One decoded line of a session log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRecord {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub kind: RecordKind,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: RecordContent,
    pub usage: Option<TokenUsage>,
    pub model: String,
    pub cwd: String,
    pub git_branch: String,
    pub agent_id: String,
    pub is_sidechain: bool,
    pub is_meta: bool,
    pub is_compact_summary: bool,
    /// `stop_reason` observed on the message or any content block.
    pub stop_reason: Option<String>,
    /// Tool invocations extracted from `tool_use` blocks.
    pub tool_calls: Vec<ToolCall>,
    /// Tool results extracted from `tool_result` blocks.
    pub tool_results: Vec<ToolResult>,
    /// `toolUseResult.tool_use_id` when the record carries one.
    pub source_tool_use_id: String,
}

impl ParsedRecord {
    /// A human-typed message: kind user, not meta, not a compact summary.
    pub fn is_real_user(&self) -> bool {
        self.kind == RecordKind::User && !self.is_meta && !self.is_compact_summary
    }
}
