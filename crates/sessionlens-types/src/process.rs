use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::ChunkMetrics;
use crate::record::ParsedRecord;

/// A nested agent execution parsed from `subagents/agent-<id>.jsonl`.
///
/// Owned by at most one AI chunk after resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentProcess {
    /// File stem with the `agent-` prefix stripped.
    pub id: String,
    pub file_path: String,
    pub records: Vec<ParsedRecord>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: i64,
    pub metrics: ChunkMetrics,
    /// Teammate summary attribute or the leading text of the first real
    /// user record.
    pub description: String,
    pub subagent_type: String,
    /// Set when another process in the same chunk started within 100 ms.
    pub is_parallel: bool,
    /// Id of the Task invocation this process was linked to.
    pub parent_task_id: String,
    pub team_name: String,
    pub member_name: String,
    /// Stable palette assignment keyed by member name; empty when the
    /// member name is empty.
    pub member_color: String,
}
