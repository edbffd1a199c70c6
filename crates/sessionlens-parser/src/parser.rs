//! Line-level record parsing.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use sessionlens_types::{
    ContentBlock, ParsedRecord, RecordContent, RecordKind, TokenUsage, ToolCall, ToolResult,
};

use crate::schema::{RawRecord, RawUsage};

/// Lines above this size are skipped rather than parsed.
pub const MAX_RECORD_BYTES: usize = 10 * 1024 * 1024;

/// Epoch values above this are interpreted as milliseconds.
const EPOCH_MILLIS_CUTOFF: f64 = 1e12;

/// Parse one log line into a record, or skip it.
///
/// Skipped: empty lines, oversize lines, JSON decode failures, records
/// with an empty id. Skips never raise; order of appearance is preserved
/// by the callers.
pub fn parse_line(line: &str) -> Option<ParsedRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.len() > MAX_RECORD_BYTES {
        warn!(bytes = line.len(), "skipping oversize record line");
        return None;
    }

    let raw: RawRecord = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(%err, "skipping malformed record line");
            return None;
        }
    };

    convert(raw)
}

fn convert(raw: RawRecord) -> Option<ParsedRecord> {
    if raw.uuid.is_empty() {
        return None;
    }

    let kind = RecordKind::from_wire(&raw.kind);
    let timestamp = parse_timestamp(&raw.timestamp);

    let usage = serde_json::from_value::<RawUsage>(raw.message.usage)
        .ok()
        .filter(|u| {
            u.input_tokens.is_some()
                || u.output_tokens.is_some()
                || u.cache_read_input_tokens.is_some()
                || u.cache_creation_input_tokens.is_some()
        })
        .map(|u| TokenUsage {
            input_tokens: u.input_tokens.unwrap_or(0),
            output_tokens: u.output_tokens.unwrap_or(0),
            cache_read_input_tokens: u.cache_read_input_tokens.unwrap_or(0),
            cache_creation_input_tokens: u.cache_creation_input_tokens.unwrap_or(0),
        });

    let (content, tool_calls, tool_results, block_stop_reason) =
        convert_content(raw.message.content);

    let source_tool_use_id = raw
        .tool_use_result
        .get("tool_use_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Some(ParsedRecord {
        uuid: raw.uuid,
        parent_uuid: raw.parent_uuid,
        kind,
        timestamp,
        role: raw.message.role,
        content,
        usage,
        model: raw.message.model,
        cwd: raw.cwd,
        git_branch: raw.git_branch,
        agent_id: raw.agent_id,
        is_sidechain: raw.is_sidechain,
        is_meta: raw.is_meta,
        is_compact_summary: raw.is_compact_summary,
        stop_reason: raw.message.stop_reason.or(block_stop_reason),
        tool_calls,
        tool_results,
        source_tool_use_id,
    })
}

/// Convert wire content into typed blocks, extracting tool calls, tool
/// results, and any block-level stop reason along the way.
fn convert_content(
    content: Value,
) -> (RecordContent, Vec<ToolCall>, Vec<ToolResult>, Option<String>) {
    let items = match content {
        Value::String(s) => return (RecordContent::Text(s), Vec::new(), Vec::new(), None),
        Value::Array(items) => items,
        _ => return (RecordContent::default(), Vec::new(), Vec::new(), None),
    };

    let mut blocks = Vec::with_capacity(items.len());
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();
    let mut stop_reason = None;

    for item in items {
        if stop_reason.is_none()
            && let Some(reason) = item.get("stop_reason").and_then(Value::as_str)
        {
            stop_reason = Some(reason.to_string());
        }

        let block = ContentBlock::from_value(item);
        match &block {
            ContentBlock::ToolUse { id, name, input } => {
                let mut call = ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                    task_description: String::new(),
                    subagent_type: String::new(),
                };
                if call.is_task() {
                    call.task_description = call.input_str("description").to_string();
                    call.subagent_type = call.input_str("subagent_type").to_string();
                }
                tool_calls.push(call);
            }
            ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                tool_results.push(ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                });
            }
            _ => {}
        }
        blocks.push(block);
    }

    (RecordContent::Blocks(blocks), tool_calls, tool_results, stop_reason)
}

/// Parse a timestamp from RFC 3339, epoch seconds, or epoch milliseconds.
/// Unparseable values fall back to the current time.
fn parse_timestamp(value: &Value) -> DateTime<Utc> {
    match value {
        Value::String(s) if !s.is_empty() => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return dt.with_timezone(&Utc);
            }
            if let Ok(secs) = s.parse::<f64>() {
                return epoch_to_datetime(secs);
            }
            Utc::now()
        }
        Value::Number(n) => match n.as_f64() {
            Some(v) => epoch_to_datetime(v),
            None => Utc::now(),
        },
        _ => Utc::now(),
    }
}

fn epoch_to_datetime(value: f64) -> DateTime<Utc> {
    let millis = if value > EPOCH_MILLIS_CUTOFF { value } else { value * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_else(Utc::now)
}
