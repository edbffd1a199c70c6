use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextStats;
use crate::process::SubagentProcess;
use crate::record::{ParsedRecord, ToolCall, ToolResult};

/// Display kind of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    User,
    Ai,
    System,
    Compact,
}

/// Completion status of an AI chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStatus {
    Complete,
    Interrupted,
    Error,
    InProgress,
}

/// Rolled-up metrics for a chunk or a subagent process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetrics {
    pub message_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub total_tokens: u64,
    pub tool_call_count: u64,
    pub cost_usd: f64,
    pub duration_ms: i64,
}

/// A tool invocation paired with its result, if one was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub call: ToolCall,
    pub result: Option<ToolResult>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: i64,
}

impl ToolExecution {
    pub fn pending(call: ToolCall, start: DateTime<Utc>) -> Self {
        Self { call, result: None, start, end: None, duration_ms: 0 }
    }
}

/// Kind-specific chunk data. Emission sites match exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkPayload {
    User {
        /// Sanitized user-typed text.
        text: String,
        commands: Vec<String>,
        file_references: Vec<String>,
    },
    Ai {
        status: AiStatus,
        tool_executions: Vec<ToolExecution>,
        processes: Vec<SubagentProcess>,
    },
    System {
        command_output: String,
    },
    Compact {
        tokens_freed: u64,
    },
}

/// A contiguous run of records presented as one view unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Deterministic per-session id, `chunk-<n>` with a 1-based ordinal.
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub metrics: ChunkMetrics,
    pub records: Vec<ParsedRecord>,
    pub payload: ChunkPayload,
    /// Populated by the context analyzer.
    pub context_stats: Option<ContextStats>,
}

impl Chunk {
    pub fn kind(&self) -> ChunkKind {
        match self.payload {
            ChunkPayload::User { .. } => ChunkKind::User,
            ChunkPayload::Ai { .. } => ChunkKind::Ai,
            ChunkPayload::System { .. } => ChunkKind::System,
            ChunkPayload::Compact { .. } => ChunkKind::Compact,
        }
    }

    /// User text for User chunks, empty otherwise.
    pub fn user_text(&self) -> &str {
        match &self.payload {
            ChunkPayload::User { text, .. } => text,
            _ => "",
        }
    }

    pub fn tool_executions(&self) -> &[ToolExecution] {
        match &self.payload {
            ChunkPayload::Ai { tool_executions, .. } => tool_executions,
            _ => &[],
        }
    }

    pub fn processes(&self) -> &[SubagentProcess] {
        match &self.payload {
            ChunkPayload::Ai { processes, .. } => processes,
            _ => &[],
        }
    }

    /// Record ids contained in this chunk, in order of appearance.
    pub fn record_ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.uuid.as_str()).collect()
    }
}
