//! Discover, parse, and link subagent log files to parent AI chunks.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use sessionlens_parser::read_records;
use sessionlens_types::{
    Chunk, ChunkMetrics, ChunkPayload, ContentBlock, RecordContent, SubagentProcess,
};

use crate::tokens::calculate_cost;

/// Two processes starting within this window are flagged parallel.
const PARALLEL_WINDOW_MS: i64 = 100;

const MEMBER_COLORS: [&str; 8] = [
    "#4A9EFF", "#FF6B6B", "#51CF66", "#FFD43B", "#CC5DE8", "#FF922B", "#22B8CF", "#F06595",
];

// Color assignment is keyed by member name, first-seen-first-served, and
// persists across calls for the process lifetime. Accessed only from the
// main context; the mutex covers incidental test parallelism.
static MEMBER_COLOR_MAP: Lazy<Mutex<(HashMap<String, String>, usize)>> =
    Lazy::new(|| Mutex::new((HashMap::new(), 0)));

static TEAMMATE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<teammate-message\b([^>]*)>").expect("static regex"));
static SUMMARY_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"summary="([^"]*)""#).expect("static regex"));
static TEAM_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"team_name="([^"]*)""#).expect("static regex"));
static MEMBER_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"member_name="([^"]*)""#).expect("static regex"));

fn assign_member_color(member_name: &str) -> String {
    if member_name.is_empty() {
        return String::new();
    }
    let mut guard = MEMBER_COLOR_MAP.lock().unwrap_or_else(|e| e.into_inner());
    let (map, next) = &mut *guard;
    if let Some(color) = map.get(member_name) {
        return color.clone();
    }
    let color = MEMBER_COLORS[*next % MEMBER_COLORS.len()].to_string();
    map.insert(member_name.to_string(), color.clone());
    *next += 1;
    color
}

/// Find `agent-*.jsonl` files under `<session_dir>/subagents/`.
///
/// Compaction artifacts (`acompact*`) are excluded. The listing is sorted
/// by path so resolution is stable across runs.
pub fn discover_subagents(session_dir: &Path) -> Vec<PathBuf> {
    let subagents_dir = session_dir.join("subagents");
    let Ok(entries) = std::fs::read_dir(&subagents_dir) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            if !path.is_file() {
                return false;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.ends_with(".jsonl") && name.starts_with("agent-") && !name.starts_with("acompact")
        })
        .collect();

    paths.sort();
    paths
}

/// Parse one subagent file into a process. Unreadable files are skipped
/// with a debug log; the caller leaves the parent Task unlinked.
pub fn parse_subagent(path: &Path) -> Option<SubagentProcess> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let id = stem.strip_prefix("agent-").unwrap_or(stem).to_string();

    let records = match read_records(path) {
        Ok(records) => records,
        Err(err) => {
            debug!(path = %path.display(), %err, "skipping unreadable subagent file");
            return None;
        }
    };

    let (start, end) = match (records.first(), records.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => {
            let now = Utc::now();
            (now, now)
        }
    };
    let duration_ms = (end - start).num_milliseconds().max(0);

    let mut metrics = ChunkMetrics::default();
    let mut model = String::new();
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
        metrics.tool_call_count += record.tool_calls.len() as u64;
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
    metrics.duration_ms = duration_ms;

    let mut description = String::new();
    let mut team_name = String::new();
    let mut member_name = String::new();

    for record in &records {
        if !record.is_real_user() {
            continue;
        }
        let text = subagent_text(&record.content);

        if let Some(caps) = TEAMMATE_TAG_RE.captures(&text) {
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            if let Some(summary) = SUMMARY_ATTR_RE.captures(attrs).and_then(|c| c.get(1)) {
                description = summary.as_str().to_string();
            }
            if let Some(team) = TEAM_ATTR_RE.captures(attrs).and_then(|c| c.get(1)) {
                team_name = team.as_str().to_string();
            }
            if let Some(member) = MEMBER_ATTR_RE.captures(attrs).and_then(|c| c.get(1)) {
                member_name = member.as_str().to_string();
            }
        }
        if description.is_empty() {
            description = text.trim().chars().take(200).collect();
        }
        break;
    }

    let member_color = assign_member_color(&member_name);

    Some(SubagentProcess {
        id,
        file_path: path.display().to_string(),
        records,
        start,
        end,
        duration_ms,
        metrics,
        description,
        subagent_type: String::new(),
        is_parallel: false,
        parent_task_id: String::new(),
        team_name,
        member_name,
        member_color,
    })
}

/// Plain text of subagent record content, including flattened tool-result
/// strings (teammate tags can arrive through either channel).
fn subagent_text(content: &RecordContent) -> String {
    match content {
        RecordContent::Text(s) => s.clone(),
        RecordContent::Blocks(blocks) => {
            let mut parts: Vec<String> = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => parts.push(text.clone()),
                    ContentBlock::ToolResult { content, .. } => {
                        let flat = sessionlens_types::ToolResult {
                            tool_use_id: String::new(),
                            content: content.clone(),
                            is_error: false,
                        }
                        .text();
                        if !flat.is_empty() {
                            parts.push(flat);
                        }
                    }
                    _ => {}
                }
            }
            parts.join("\n")
        }
    }
}

/// Link discovered subagent processes to the AI chunks that spawned them.
///
/// Three phases: result-reference scan, description match, positional
/// fallback. Each process ends up owned by at most one chunk. Afterwards,
/// processes in the same chunk starting within 100 ms of each other are
/// flagged parallel.
pub fn resolve_subagents(chunks: &mut [Chunk], session_dir: &Path) {
    let paths = discover_subagents(session_dir);
    if paths.is_empty() {
        return;
    }

    let mut procs: Vec<Option<SubagentProcess>> =
        paths.iter().map(|p| parse_subagent(p)).collect();

    let ai_indices: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c.payload, ChunkPayload::Ai { .. }))
        .map(|(i, _)| i)
        .collect();

    let mut linked_tool_ids: HashSet<String> = HashSet::new();

    // Phase 1: result-reference scan
    for &ci in &ai_indices {
        let mut links: Vec<(usize, String)> = Vec::new();

        for record in &chunks[ci].records {
            for result in &record.tool_results {
                let text = result.text();
                if text.is_empty() {
                    continue;
                }

                for (pi, slot) in procs.iter().enumerate() {
                    let Some(proc) = slot else { continue };
                    if links.iter().any(|(existing, _)| *existing == pi) {
                        continue;
                    }
                    if !references_agent(&text, &proc.id) {
                        continue;
                    }
                    if let Some(task_id) =
                        find_task_for_result(&chunks[ci], &result.tool_use_id, &linked_tool_ids)
                    {
                        linked_tool_ids.insert(task_id.clone());
                        links.push((pi, task_id));
                        break;
                    }
                }
            }
        }

        // Records that carry the spawned agent id directly
        for record in &chunks[ci].records {
            let Some(ref_id) = record.agent_id.strip_prefix("agent-") else {
                continue;
            };
            let Some(pi) = procs.iter().position(|slot| {
                slot.as_ref().is_some_and(|p| p.id == ref_id)
            }) else {
                continue;
            };
            if links.iter().any(|(existing, _)| *existing == pi) {
                continue;
            }

            for result in &record.tool_results {
                if let Some(task_id) =
                    find_task_for_result(&chunks[ci], &result.tool_use_id, &linked_tool_ids)
                {
                    linked_tool_ids.insert(task_id.clone());
                    links.push((pi, task_id));
                    break;
                }
            }
        }

        attach(&mut chunks[ci], &mut procs, links);
    }

    // Phase 2: description match
    for &ci in &ai_indices {
        let mut links: Vec<(usize, String)> = Vec::new();

        let candidates: Vec<(String, String)> = chunks[ci]
            .tool_executions()
            .iter()
            .filter(|e| e.call.is_task() && !linked_tool_ids.contains(&e.call.id))
            .map(|e| (e.call.id.clone(), e.call.task_description.clone()))
            .collect();

        for (task_id, description) in candidates {
            let task_desc = description.trim().to_lowercase();
            if task_desc.is_empty() {
                continue;
            }

            for (pi, slot) in procs.iter().enumerate() {
                let Some(proc) = slot else { continue };
                if links.iter().any(|(existing, _)| *existing == pi) {
                    continue;
                }
                let proc_desc = proc.description.trim().to_lowercase();
                if proc_desc.is_empty() {
                    continue;
                }
                if task_desc.contains(&proc_desc) || proc_desc.contains(&task_desc) {
                    linked_tool_ids.insert(task_id.clone());
                    links.push((pi, task_id));
                    break;
                }
            }
        }

        attach(&mut chunks[ci], &mut procs, links);
    }

    // Phase 3: positional fallback
    let mut remaining_procs: Vec<usize> = procs
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_some())
        .map(|(i, _)| i)
        .collect();
    remaining_procs.sort_by_key(|&pi| procs[pi].as_ref().map(|p| p.start));

    let mut remaining_tasks: Vec<(usize, String, chrono::DateTime<Utc>)> = Vec::new();
    for &ci in &ai_indices {
        for exec in chunks[ci].tool_executions() {
            if exec.call.is_task() && !linked_tool_ids.contains(&exec.call.id) {
                remaining_tasks.push((ci, exec.call.id.clone(), exec.start));
            }
        }
    }
    remaining_tasks.sort_by_key(|(_, _, start)| *start);

    for (&pi, (ci, task_id, _)) in remaining_procs.iter().zip(remaining_tasks) {
        linked_tool_ids.insert(task_id.clone());
        attach(&mut chunks[ci], &mut procs, vec![(pi, task_id)]);
    }

    detect_parallel(chunks);
}

fn references_agent(text: &str, agent_id: &str) -> bool {
    let full_ref = format!("agent-{agent_id}");
    let short_ref = format!("agentId: {agent_id}");
    let json_ref = format!("agentId\":\"agent-{agent_id}\"");
    text.contains(&full_ref) || text.contains(&short_ref) || text.contains(&json_ref)
}

/// Pick the Task execution matching a tool result: exact id match first,
/// falling back to the first unlinked Task in the chunk.
fn find_task_for_result(
    chunk: &Chunk,
    tool_use_id: &str,
    linked_tool_ids: &HashSet<String>,
) -> Option<String> {
    let executions = chunk.tool_executions();

    for exec in executions {
        if exec.call.id == tool_use_id
            && exec.call.is_task()
            && !linked_tool_ids.contains(&exec.call.id)
        {
            return Some(exec.call.id.clone());
        }
    }

    executions
        .iter()
        .find(|e| e.call.is_task() && !linked_tool_ids.contains(&e.call.id))
        .map(|e| e.call.id.clone())
}

fn attach(chunk: &mut Chunk, procs: &mut [Option<SubagentProcess>], links: Vec<(usize, String)>) {
    if links.is_empty() {
        return;
    }
    let ChunkPayload::Ai { processes, .. } = &mut chunk.payload else {
        return;
    };
    for (pi, task_id) in links {
        if let Some(mut proc) = procs[pi].take() {
            proc.parent_task_id = task_id;
            processes.push(proc);
        }
    }
}

fn detect_parallel(chunks: &mut [Chunk]) {
    for chunk in chunks.iter_mut() {
        let ChunkPayload::Ai { processes, .. } = &mut chunk.payload else {
            continue;
        };
        if processes.len() < 2 {
            continue;
        }

        let starts: Vec<_> = processes.iter().map(|p| p.start).collect();
        for i in 0..processes.len() {
            for j in 0..processes.len() {
                if i == j {
                    continue;
                }
                let delta = (starts[i] - starts[j]).num_milliseconds().abs();
                if delta <= PARALLEL_WINDOW_MS {
                    processes[i].is_parallel = true;
                }
            }
        }
    }
}
