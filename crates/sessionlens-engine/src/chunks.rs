//! State machine that groups parsed records into display chunks.

use std::collections::HashMap;

use sessionlens_types::{
    AiStatus, Chunk, ChunkMetrics, ChunkPayload, ParsedRecord, RecordKind, ToolExecution,
};

use crate::sanitize::{extract_file_references, extract_slash_commands, extract_user_text};
use crate::tokens::calculate_cost;

/// Build display chunks from a list of parsed records.
///
/// Transitions, applied in order per record:
/// - compact summary: flush the AI buffer, emit a Compact chunk (checked
///   before the noise filter because compact summaries carry kind Summary)
/// - hard noise (summary, file-history-snapshot, queue-operation): dropped
/// - real user record: flush, emit a User chunk
/// - non-meta system record: joins an open AI turn, else its own chunk
/// - everything else (assistant records, meta user records carrying tool
///   results): appended to the AI buffer
///
/// Deterministic: the same record sequence yields the same chunks with
/// the same ids, which keeps incremental reloads prefix-stable.
pub fn build_chunks(records: &[ParsedRecord]) -> Vec<Chunk> {
    let mut builder = ChunkBuilder::default();
    for record in records {
        builder.process(record);
    }
    builder.finish()
}

#[derive(Default)]
struct ChunkBuilder {
    chunks: Vec<Chunk>,
    ai_buffer: Vec<ParsedRecord>,
    counter: u64,
}

impl ChunkBuilder {
    fn process(&mut self, record: &ParsedRecord) {
        if record.is_compact_summary {
            self.flush_ai_buffer();
            self.push_compact_chunk(record.clone());
            return;
        }

        if record.kind.is_hard_noise() {
            return;
        }

        if record.kind == RecordKind::User && !record.is_meta {
            self.flush_ai_buffer();
            self.push_user_chunk(record.clone());
            return;
        }

        if record.kind == RecordKind::System && !record.is_meta {
            if !self.ai_buffer.is_empty() {
                self.ai_buffer.push(record.clone());
            } else {
                self.push_system_chunk(record.clone());
            }
            return;
        }

        self.ai_buffer.push(record.clone());
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush_ai_buffer();
        self.chunks
    }

    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("chunk-{}", self.counter)
    }

    fn flush_ai_buffer(&mut self) {
        if self.ai_buffer.is_empty() {
            return;
        }
        let records = std::mem::take(&mut self.ai_buffer);
        self.push_ai_chunk(records);
    }

    fn push_user_chunk(&mut self, record: ParsedRecord) {
        let text = extract_user_text(&record.content);
        let commands = extract_slash_commands(&text);
        let file_references = extract_file_references(&text);

        let id = self.next_id();
        self.chunks.push(Chunk {
            id,
            start: record.timestamp,
            end: record.timestamp,
            metrics: ChunkMetrics { message_count: 1, ..Default::default() },
            records: vec![record],
            payload: ChunkPayload::User { text, commands, file_references },
            context_stats: None,
        });
    }

    fn push_ai_chunk(&mut self, records: Vec<ParsedRecord>) {
        let mut metrics = ChunkMetrics::default();
        let mut model = String::new();
        let mut executions: Vec<ToolExecution> = Vec::new();
        let mut execution_index: HashMap<String, usize> = HashMap::new();

        for record in &records {
            metrics.message_count += 1;

            if let Some(usage) = &record.usage {
                metrics.input_tokens += usage.input_tokens;
                metrics.output_tokens += usage.output_tokens;
                metrics.cache_read_tokens += usage.cache_read_input_tokens;
                metrics.cache_creation_tokens += usage.cache_creation_input_tokens;
                metrics.total_tokens += usage.total();
            }

            if model.is_empty() && !record.model.is_empty() {
                model = record.model.clone();
            }

            for call in &record.tool_calls {
                metrics.tool_call_count += 1;
                execution_index.insert(call.id.clone(), executions.len());
                executions.push(ToolExecution::pending(call.clone(), record.timestamp));
            }

            for result in &record.tool_results {
                if let Some(&idx) = execution_index.get(&result.tool_use_id) {
                    let exec = &mut executions[idx];
                    exec.result = Some(result.clone());
                    exec.end = Some(record.timestamp);
                    exec.duration_ms =
                        (record.timestamp - exec.start).num_milliseconds().max(0);
                }
            }
        }

        if !model.is_empty() {
            metrics.cost_usd = calculate_cost(
                metrics.input_tokens,
                metrics.output_tokens,
                metrics.cache_read_tokens,
                metrics.cache_creation_tokens,
                &model,
            );
        }

        let start = records[0].timestamp;
        let end = records[records.len() - 1].timestamp;
        metrics.duration_ms = (end - start).num_milliseconds().max(0);

        let status = determine_status(&records);

        let id = self.next_id();
        self.chunks.push(Chunk {
            id,
            start,
            end,
            metrics,
            records,
            payload: ChunkPayload::Ai {
                status,
                tool_executions: executions,
                processes: Vec::new(),
            },
            context_stats: None,
        });
    }

    fn push_system_chunk(&mut self, record: ParsedRecord) {
        let command_output = record.content.plain_text();
        let id = self.next_id();
        self.chunks.push(Chunk {
            id,
            start: record.timestamp,
            end: record.timestamp,
            metrics: ChunkMetrics { message_count: 1, ..Default::default() },
            records: vec![record],
            payload: ChunkPayload::System { command_output },
            context_stats: None,
        });
    }

    fn push_compact_chunk(&mut self, record: ParsedRecord) {
        let id = self.next_id();
        self.chunks.push(Chunk {
            id,
            start: record.timestamp,
            end: record.timestamp,
            metrics: ChunkMetrics { message_count: 1, ..Default::default() },
            records: vec![record],
            payload: ChunkPayload::Compact { tokens_freed: 0 },
            context_stats: None,
        });
    }
}

fn determine_status(records: &[ParsedRecord]) -> AiStatus {
    for record in records {
        for result in &record.tool_results {
            if result.is_error {
                return AiStatus::Error;
            }
        }
    }

    if records.iter().any(|r| r.stop_reason.as_deref() == Some("max_tokens")) {
        return AiStatus::Interrupted;
    }

    AiStatus::Complete
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use sessionlens_types::{ChunkKind, RecordContent, TokenUsage, ToolCall, ToolResult};
    use serde_json::json;

    fn ts(offset_secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_770_984_000 + offset_secs, 0).single().unwrap()
    }

    fn record(uuid: &str, kind: RecordKind, offset_secs: i64) -> ParsedRecord {
        ParsedRecord {
            uuid: uuid.to_string(),
            parent_uuid: None,
            kind,
            timestamp: ts(offset_secs),
            role: match kind {
                RecordKind::User => "user".to_string(),
                RecordKind::Assistant => "assistant".to_string(),
                _ => String::new(),
            },
            content: RecordContent::Text(String::new()),
            usage: None,
            model: String::new(),
            cwd: String::new(),
            git_branch: String::new(),
            agent_id: String::new(),
            is_sidechain: false,
            is_meta: false,
            is_compact_summary: false,
            stop_reason: None,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            source_tool_use_id: String::new(),
        }
    }

    fn user(uuid: &str, text: &str, offset_secs: i64) -> ParsedRecord {
        let mut r = record(uuid, RecordKind::User, offset_secs);
        r.content = RecordContent::Text(text.to_string());
        r
    }

    fn assistant(uuid: &str, offset_secs: i64) -> ParsedRecord {
        record(uuid, RecordKind::Assistant, offset_secs)
    }

    fn meta_user_with_result(uuid: &str, tool_use_id: &str, offset_secs: i64) -> ParsedRecord {
        let mut r = record(uuid, RecordKind::User, offset_secs);
        r.is_meta = true;
        r.tool_results.push(ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: json!("ok"),
            is_error: false,
        });
        r
    }

    fn with_call(mut r: ParsedRecord, id: &str, name: &str) -> ParsedRecord {
        r.tool_calls.push(ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            input: json!({}),
            task_description: String::new(),
            subagent_type: String::new(),
        });
        r
    }

    #[test]
    fn test_simple_alternation() {
        // Scenario: user, assistant, user, assistant, user
        let records = vec![
            user("u1", "Hello", 0),
            assistant("a1", 1),
            user("u2", "More", 2),
            assistant("a2", 3),
            user("u3", "Bye", 4),
        ];

        let chunks = build_chunks(&records);
        let kinds: Vec<ChunkKind> = chunks.iter().map(Chunk::kind).collect();
        assert_eq!(
            kinds,
            vec![ChunkKind::User, ChunkKind::Ai, ChunkKind::User, ChunkKind::Ai, ChunkKind::User]
        );
        assert_eq!(chunks[0].user_text(), "Hello");
        assert_eq!(chunks[4].user_text(), "Bye");
        assert_eq!(chunks[0].id, "chunk-1");
        assert_eq!(chunks[4].id, "chunk-5");
    }

    #[test]
    fn test_tool_loop_grouping() {
        // One user turn, then an AI turn spanning three tool round-trips,
        // another user turn, then a single-tool AI turn.
        let records = vec![
            user("t01", "Do the thing", 0),
            with_call(assistant("t02", 1), "toolu_read", "Read"),
            meta_user_with_result("t03", "toolu_read", 2),
            with_call(assistant("t04", 3), "toolu_edit", "Edit"),
            meta_user_with_result("t05", "toolu_edit", 4),
            with_call(assistant("t06", 5), "toolu_bash", "Bash"),
            meta_user_with_result("t07", "toolu_bash", 6),
            assistant("t08", 7),
            user("t09", "Next", 8),
            with_call(assistant("t10", 9), "toolu_grep", "Grep"),
            meta_user_with_result("t11", "toolu_grep", 10),
            assistant("t12", 11),
        ];

        let chunks = build_chunks(&records);
        assert_eq!(chunks.len(), 4);
        assert_eq!(
            chunks.iter().map(Chunk::kind).collect::<Vec<_>>(),
            vec![ChunkKind::User, ChunkKind::Ai, ChunkKind::User, ChunkKind::Ai]
        );

        let first_ai = &chunks[1];
        assert_eq!(first_ai.records.len(), 7);
        assert_eq!(first_ai.record_ids(), vec!["t02", "t03", "t04", "t05", "t06", "t07", "t08"]);
        let execs = first_ai.tool_executions();
        assert_eq!(execs.len(), 3);
        assert!(execs.iter().all(|e| e.result.is_some()));
        let names: Vec<&str> = execs.iter().map(|e| e.call.name.as_str()).collect();
        assert_eq!(names, vec!["Read", "Edit", "Bash"]);

        let second_ai = &chunks[3];
        assert_eq!(second_ai.records.len(), 3);
        let execs = second_ai.tool_executions();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].call.name, "Grep");
        assert!(execs[0].result.is_some());
    }

    #[test]
    fn test_compact_boundary() {
        let mut compact = record("c05", RecordKind::Summary, 5);
        compact.is_compact_summary = true;
        compact.content = RecordContent::Text("Summary of earlier work".to_string());

        let records = vec![
            user("c01", "Start", 0),
            assistant("c02", 1),
            user("c04", "Continue", 3),
            assistant("c04b", 4),
            compact,
            user("c06", "After compact", 6),
            assistant("c07", 7),
        ];

        let chunks = build_chunks(&records);
        assert_eq!(
            chunks.iter().map(Chunk::kind).collect::<Vec<_>>(),
            vec![
                ChunkKind::User,
                ChunkKind::Ai,
                ChunkKind::User,
                ChunkKind::Ai,
                ChunkKind::Compact,
                ChunkKind::User,
                ChunkKind::Ai
            ]
        );
    }

    #[test]
    fn test_hard_noise_dropped() {
        let records = vec![
            record("s1", RecordKind::Summary, 0),
            record("f1", RecordKind::FileHistorySnapshot, 1),
            record("q1", RecordKind::QueueOperation, 2),
            user("u1", "Real", 3),
        ];
        let chunks = build_chunks(&records);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind(), ChunkKind::User);
    }

    #[test]
    fn test_system_joins_open_ai_turn() {
        let mut sys = record("s1", RecordKind::System, 2);
        sys.content = RecordContent::Text("hook output".to_string());

        let records = vec![user("u1", "Go", 0), assistant("a1", 1), sys, assistant("a2", 3)];
        let chunks = build_chunks(&records);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].kind(), ChunkKind::Ai);
        assert_eq!(chunks[1].records.len(), 3);
    }

    #[test]
    fn test_standalone_system_chunk() {
        let mut sys = record("s1", RecordKind::System, 0);
        sys.content = RecordContent::Text("ran /doctor".to_string());

        let chunks = build_chunks(&[sys]);
        assert_eq!(chunks.len(), 1);
        match &chunks[0].payload {
            ChunkPayload::System { command_output } => assert_eq!(command_output, "ran /doctor"),
            other => panic!("expected System payload, got {other:?}"),
        }
    }

    #[test]
    fn test_metrics_and_cost() {
        let mut a1 = assistant("a1", 0);
        a1.model = "claude-sonnet-4-5-20250929".to_string();
        a1.usage = Some(TokenUsage {
            input_tokens: 1000,
            output_tokens: 500,
            cache_read_input_tokens: 200,
            cache_creation_input_tokens: 100,
        });
        let mut a2 = assistant("a2", 3);
        a2.usage = Some(TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            cache_read_input_tokens: 0,
            cache_creation_input_tokens: 0,
        });

        let chunks = build_chunks(&[a1, a2]);
        assert_eq!(chunks.len(), 1);
        let m = &chunks[0].metrics;
        assert_eq!(m.message_count, 2);
        assert_eq!(m.input_tokens, 1100);
        assert_eq!(m.output_tokens, 550);
        assert_eq!(m.cache_read_tokens, 200);
        assert_eq!(m.cache_creation_tokens, 100);
        assert_eq!(m.total_tokens, 1950);
        assert_eq!(m.duration_ms, 3000);
        assert!(m.cost_usd > 0.0);
    }

    #[test]
    fn test_unknown_model_cost_zero() {
        let mut a1 = assistant("a1", 0);
        a1.model = "mystery-model".to_string();
        a1.usage = Some(TokenUsage { input_tokens: 1000, ..Default::default() });

        let chunks = build_chunks(&[a1]);
        assert_eq!(chunks[0].metrics.cost_usd, 0.0);
    }

    #[test]
    fn test_status_error_on_error_result() {
        let a1 = with_call(assistant("a1", 0), "toolu_x", "Bash");
        let mut m1 = meta_user_with_result("m1", "toolu_x", 1);
        m1.tool_results[0].is_error = true;
        let a2 = assistant("a2", 2);

        let chunks = build_chunks(&[a1, m1, a2]);
        match &chunks[0].payload {
            ChunkPayload::Ai { status, .. } => assert_eq!(*status, AiStatus::Error),
            other => panic!("expected Ai payload, got {other:?}"),
        }
    }

    #[test]
    fn test_status_interrupted_on_max_tokens() {
        let mut a1 = assistant("a1", 0);
        a1.stop_reason = Some("max_tokens".to_string());

        let chunks = build_chunks(&[a1]);
        match &chunks[0].payload {
            ChunkPayload::Ai { status, .. } => assert_eq!(*status, AiStatus::Interrupted),
            other => panic!("expected Ai payload, got {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_call_stays_pending() {
        let a1 = with_call(assistant("a1", 0), "toolu_pending", "Bash");
        let chunks = build_chunks(&[a1]);
        let execs = chunks[0].tool_executions();
        assert_eq!(execs.len(), 1);
        assert!(execs[0].result.is_none());
        assert!(execs[0].end.is_none());
        match &chunks[0].payload {
            ChunkPayload::Ai { status, .. } => assert_eq!(*status, AiStatus::Complete),
            other => panic!("expected Ai payload, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(build_chunks(&[]).is_empty());
    }

    #[test]
    fn test_determinism_prefix_stability() {
        let records = vec![
            user("u1", "One", 0),
            assistant("a1", 1),
            user("u2", "Two", 2),
            assistant("a2", 3),
            assistant("a3", 4),
        ];

        let full = build_chunks(&records);
        let prefix = build_chunks(&records[..3]);

        // Every chunk built from the prefix matches the full run by id and
        // record membership; only the trailing open chunk may differ.
        for (p, f) in prefix.iter().zip(full.iter()) {
            assert_eq!(p.id, f.id);
            if p.record_ids() != f.record_ids() {
                // Allowed only for the last prefix chunk, which was still
                // accumulating when the stream was cut.
                assert_eq!(p.id, prefix.last().unwrap().id);
            }
        }
    }

    #[test]
    fn test_leading_compact_chunk() {
        let mut compact = record("c1", RecordKind::Summary, 0);
        compact.is_compact_summary = true;
        compact.content = RecordContent::Text("carried over".to_string());

        let chunks = build_chunks(&[compact, user("u1", "hi", 1)]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind(), ChunkKind::Compact);
        assert_eq!(chunks[1].kind(), ChunkKind::User);
    }

    #[test]
    fn test_user_chunk_extracts_commands_and_mentions() {
        let chunks = build_chunks(&[user("u1", "/review please look at @src/lib.rs", 0)]);
        match &chunks[0].payload {
            ChunkPayload::User { commands, file_references, .. } => {
                assert_eq!(commands, &vec!["/review".to_string()]);
                assert_eq!(file_references, &vec!["src/lib.rs".to_string()]);
            }
            other => panic!("expected User payload, got {other:?}"),
        }
    }
}
