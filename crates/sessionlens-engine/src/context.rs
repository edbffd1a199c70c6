//! Context-token attribution across conversation chunks.
//!
//! Walks chunks in order, deriving `ContextInjection`s per chunk and
//! accumulating them for the current phase. A Compact chunk records how
//! many tokens the compaction freed, then resets the accumulation and
//! advances the phase counter.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use sessionlens_types::{
    Chunk, ChunkPayload, ContentBlock, ContextCategory, ContextInjection, ContextStats,
    TokenBreakdown, ToolCall,
};

use crate::tokens::{estimate_content_tokens, estimate_result_tokens, estimate_tokens};

/// Paths whose Read results count as configuration documents.
const CONFIG_DOC_SUFFIXES: [&str; 4] =
    ["CLAUDE.md", ".claude/settings.json", ".claude/settings.local.json", ".clauderc"];

/// Tool names that constitute task coordination.
const TASK_TOOL_NAMES: [&str; 7] =
    ["Task", "TaskCreate", "TaskUpdate", "TaskList", "TaskGet", "TaskOutput", "Skill"];

static FILE_MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([\w./\\-]+)").expect("static regex"));

/// Attribute context tokens for every chunk, in place.
///
/// Pure fold over the chunk order: re-running on the same chunks yields
/// identical stats, including injection ids.
pub fn analyze_context(chunks: &mut [Chunk]) {
    let mut phase_number: u32 = 1;
    let mut accumulated: Vec<ContextInjection> = Vec::new();
    let mut tokens_by_category: BTreeMap<ContextCategory, u64> = BTreeMap::new();

    for index in 0..chunks.len() {
        if matches!(chunks[index].payload, ChunkPayload::Compact { .. }) {
            let pre_compaction: u64 = accumulated.iter().map(|inj| inj.estimated_tokens).sum();
            let summary_tokens: u64 = chunks[index]
                .records
                .iter()
                .map(|r| estimate_content_tokens(&r.content))
                .sum();

            if let ChunkPayload::Compact { tokens_freed } = &mut chunks[index].payload {
                *tokens_freed = pre_compaction.saturating_sub(summary_tokens);
            }

            chunks[index].context_stats = Some(ContextStats {
                new_injections: Vec::new(),
                accumulated_injections: accumulated.clone(),
                tokens_by_category: tokens_by_category.clone(),
                total_estimated_tokens: pre_compaction,
                phase_number,
            });

            phase_number += 1;
            accumulated.clear();
            tokens_by_category.clear();
            continue;
        }

        let new_injections = match chunks[index].payload {
            ChunkPayload::Ai { .. } => analyze_ai_chunk(chunks, index),
            ChunkPayload::User { .. } => analyze_user_chunk(&chunks[index], index),
            ChunkPayload::System { .. } | ChunkPayload::Compact { .. } => Vec::new(),
        };

        for injection in &new_injections {
            *tokens_by_category.entry(injection.category).or_insert(0) +=
                injection.estimated_tokens;
        }
        accumulated.extend(new_injections.iter().cloned());

        chunks[index].context_stats = Some(ContextStats {
            new_injections,
            accumulated_injections: accumulated.clone(),
            tokens_by_category: tokens_by_category.clone(),
            total_estimated_tokens: accumulated.iter().map(|inj| inj.estimated_tokens).sum(),
            phase_number,
        });
    }
}

fn analyze_ai_chunk(chunks: &[Chunk], index: usize) -> Vec<ContextInjection> {
    let chunk = &chunks[index];
    let prev_user = chunks[..index]
        .iter()
        .rev()
        .find(|c| matches!(c.payload, ChunkPayload::User { .. }));

    let mut injections = Vec::new();
    let mut seq = InjectionSeq::new(index);

    detect_config_docs(chunk, &mut seq, &mut injections);
    detect_mentioned_files(chunk, prev_user, &mut seq, &mut injections);
    detect_tool_output(chunk, &mut seq, &mut injections);
    detect_thinking_text(chunk, &mut seq, &mut injections);
    detect_task_coordination(chunk, &mut seq, &mut injections);

    injections
}

fn analyze_user_chunk(chunk: &Chunk, index: usize) -> Vec<ContextInjection> {
    // Sized from the unsanitized record content; sanitization only affects
    // display surfaces.
    let raw_text: String =
        chunk.records.iter().map(|r| r.content.plain_text()).collect::<Vec<_>>().join("\n");
    let tokens = estimate_tokens(&raw_text);
    if tokens == 0 {
        return Vec::new();
    }

    let mut seq = InjectionSeq::new(index);
    vec![seq.injection(ContextCategory::UserMessage, tokens, "", "User message", Vec::new())]
}

fn detect_config_docs(chunk: &Chunk, seq: &mut InjectionSeq, out: &mut Vec<ContextInjection>) {
    for record in &chunk.records {
        for call in &record.tool_calls {
            if call.name == "Read" && is_config_doc_path(call.input_str("file_path")) {
                let path = call.input_str("file_path").to_string();
                let tokens = find_tool_result_tokens(&call.id, chunk);
                let display = path_display_name(&path);
                out.push(seq.injection(ContextCategory::ConfigDoc, tokens, &path, &display, Vec::new()));
            }
        }

        for block in record.content.blocks() {
            if let ContentBlock::Text { text } = block
                && text.contains("system-reminder")
            {
                let tokens = estimate_tokens(text);
                out.push(seq.injection(
                    ContextCategory::ConfigDoc,
                    tokens,
                    "",
                    "System reminder",
                    Vec::new(),
                ));
            }
        }
        if let sessionlens_types::RecordContent::Text(text) = &record.content
            && text.contains("system-reminder")
        {
            let tokens = estimate_tokens(text);
            out.push(seq.injection(
                ContextCategory::ConfigDoc,
                tokens,
                "",
                "System reminder",
                Vec::new(),
            ));
        }
    }
}

fn detect_mentioned_files(
    chunk: &Chunk,
    prev_user: Option<&Chunk>,
    seq: &mut InjectionSeq,
    out: &mut Vec<ContextInjection>,
) {
    let Some(prev) = prev_user else { return };
    let user_text = prev.user_text();
    if user_text.is_empty() {
        return;
    }

    for caps in FILE_MENTION_RE.captures_iter(user_text) {
        let Some(mention) = caps.get(1) else { continue };
        let mention = mention.as_str();

        let mut tokens = find_read_tokens_for_path(mention, chunk);
        if tokens == 0 {
            tokens = estimate_tokens(mention);
        }

        let display = path_display_name(mention);
        out.push(seq.injection(ContextCategory::MentionedFile, tokens, mention, &display, Vec::new()));
    }
}

fn detect_tool_output(chunk: &Chunk, seq: &mut InjectionSeq, out: &mut Vec<ContextInjection>) {
    for record in &chunk.records {
        for call in &record.tool_calls {
            if is_task_tool(&call.name) {
                continue;
            }
            if call.name == "Read" && is_config_doc_path(call.input_str("file_path")) {
                continue;
            }

            let input_tokens = estimate_call_input_tokens(call);
            let result_tokens = find_tool_result_tokens(&call.id, chunk);
            out.push(seq.injection(
                ContextCategory::ToolOutput,
                input_tokens + result_tokens,
                "",
                &call.name,
                vec![
                    TokenBreakdown { label: "input".to_string(), tokens: input_tokens },
                    TokenBreakdown { label: "output".to_string(), tokens: result_tokens },
                ],
            ));
        }
    }
}

fn detect_thinking_text(chunk: &Chunk, seq: &mut InjectionSeq, out: &mut Vec<ContextInjection>) {
    for record in &chunk.records {
        if record.role != "assistant" {
            continue;
        }
        for block in record.content.blocks() {
            if let ContentBlock::Thinking { thinking } = block {
                let tokens = estimate_tokens(thinking);
                if tokens > 0 {
                    out.push(seq.injection(
                        ContextCategory::ThinkingText,
                        tokens,
                        "",
                        "Extended thinking",
                        Vec::new(),
                    ));
                }
            }
        }
    }
}

fn detect_task_coordination(chunk: &Chunk, seq: &mut InjectionSeq, out: &mut Vec<ContextInjection>) {
    for record in &chunk.records {
        for call in &record.tool_calls {
            if !is_task_tool(&call.name) {
                continue;
            }

            let input_tokens = estimate_call_input_tokens(call);
            let result_tokens = find_tool_result_tokens(&call.id, chunk);
            out.push(seq.injection(
                ContextCategory::TaskCoordination,
                input_tokens + result_tokens,
                "",
                &call.name,
                vec![
                    TokenBreakdown { label: "input".to_string(), tokens: input_tokens },
                    TokenBreakdown { label: "output".to_string(), tokens: result_tokens },
                ],
            ));
        }
    }
}

/// Deterministic injection id allocator: `ctx-<turn>-<n>`.
struct InjectionSeq {
    turn_index: usize,
    next: usize,
}

impl InjectionSeq {
    fn new(turn_index: usize) -> Self {
        Self { turn_index, next: 0 }
    }

    fn injection(
        &mut self,
        category: ContextCategory,
        estimated_tokens: u64,
        path: &str,
        display_name: &str,
        tool_breakdown: Vec<TokenBreakdown>,
    ) -> ContextInjection {
        let id = format!("ctx-{}-{}", self.turn_index, self.next);
        self.next += 1;
        ContextInjection {
            id,
            category,
            estimated_tokens,
            path: path.to_string(),
            display_name: display_name.to_string(),
            turn_index: self.turn_index,
            tool_breakdown,
        }
    }
}

fn is_task_tool(name: &str) -> bool {
    TASK_TOOL_NAMES.contains(&name)
}

fn is_config_doc_path(path: &str) -> bool {
    !path.is_empty() && CONFIG_DOC_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

fn estimate_call_input_tokens(call: &ToolCall) -> u64 {
    estimate_tokens(&serde_json::to_string(&call.input).unwrap_or_default())
}

fn find_tool_result_tokens(tool_use_id: &str, chunk: &Chunk) -> u64 {
    for record in &chunk.records {
        for result in &record.tool_results {
            if result.tool_use_id == tool_use_id {
                return estimate_result_tokens(&result.content);
            }
        }
    }
    0
}

fn find_read_tokens_for_path(mention: &str, chunk: &Chunk) -> u64 {
    for record in &chunk.records {
        for call in &record.tool_calls {
            if call.name != "Read" {
                continue;
            }
            let call_path = call.input_str("file_path");
            if call_path.is_empty() {
                continue;
            }
            if call_path.ends_with(mention) || mention.ends_with(call_path) {
                return find_tool_result_tokens(&call.id, chunk);
            }
        }
    }
    0
}

fn path_display_name(path: &str) -> String {
    path.replace('\\', "/")
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}
