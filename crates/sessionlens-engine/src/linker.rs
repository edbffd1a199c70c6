//! Standalone tool call/result pairing, used outside of chunk context
//! for audits and tests.

use std::collections::{HashMap, HashSet};

use sessionlens_types::{ParsedRecord, ToolCall, ToolExecution, ToolResult};

/// Link every tool call to its result across a record sequence.
///
/// Calls without a result are included with `result: None`. Executions
/// are ordered by start time ascending.
pub fn link_tool_executions(records: &[ParsedRecord]) -> Vec<ToolExecution> {
    let mut executions: Vec<ToolExecution> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        for call in &record.tool_calls {
            index.insert(call.id.as_str(), executions.len());
            executions.push(ToolExecution::pending(call.clone(), record.timestamp));
        }
    }

    for record in records {
        for result in &record.tool_results {
            if let Some(&idx) = index.get(result.tool_use_id.as_str()) {
                let exec = &mut executions[idx];
                exec.result = Some(result.clone());
                exec.end = Some(record.timestamp);
                exec.duration_ms = (record.timestamp - exec.start).num_milliseconds().max(0);
            }
        }
    }

    executions.sort_by_key(|e| e.start);
    executions
}

/// Tool calls with no matching result (pending or lost).
pub fn find_unmatched_calls(records: &[ParsedRecord]) -> Vec<ToolCall> {
    let result_ids: HashSet<&str> = records
        .iter()
        .flat_map(|r| r.tool_results.iter())
        .map(|tr| tr.tool_use_id.as_str())
        .collect();

    records
        .iter()
        .flat_map(|r| r.tool_calls.iter())
        .filter(|tc| !result_ids.contains(tc.id.as_str()))
        .cloned()
        .collect()
}

/// Tool results whose invocation never appeared in the sequence.
pub fn find_orphaned_results(records: &[ParsedRecord]) -> Vec<ToolResult> {
    let call_ids: HashSet<&str> = records
        .iter()
        .flat_map(|r| r.tool_calls.iter())
        .map(|tc| tc.id.as_str())
        .collect();

    records
        .iter()
        .flat_map(|r| r.tool_results.iter())
        .filter(|tr| !call_ids.contains(tr.tool_use_id.as_str()))
        .cloned()
        .collect()
}

/// Group executions by tool name for summary display.
pub fn group_by_tool_name(executions: &[ToolExecution]) -> HashMap<String, Vec<ToolExecution>> {
    let mut groups: HashMap<String, Vec<ToolExecution>> = HashMap::new();
    for exec in executions {
        groups.entry(exec.call.name.clone()).or_default().push(exec.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sessionlens_types::{RecordContent, RecordKind};
    use serde_json::json;

    fn record_with(
        uuid: &str,
        offset_secs: i64,
        calls: Vec<(&str, &str)>,
        results: Vec<&str>,
    ) -> ParsedRecord {
        ParsedRecord {
            uuid: uuid.to_string(),
            parent_uuid: None,
            kind: RecordKind::Assistant,
            timestamp: Utc.timestamp_opt(1_770_984_000 + offset_secs, 0).single().unwrap(),
            role: "assistant".to_string(),
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
            tool_calls: calls
                .into_iter()
                .map(|(id, name)| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    input: json!({}),
                    task_description: String::new(),
                    subagent_type: String::new(),
                })
                .collect(),
            tool_results: results
                .into_iter()
                .map(|id| ToolResult {
                    tool_use_id: id.to_string(),
                    content: json!("done"),
                    is_error: false,
                })
                .collect(),
            source_tool_use_id: String::new(),
        }
    }

    #[test]
    fn test_links_calls_to_results() {
        let records = vec![
            record_with("a1", 0, vec![("t1", "Read"), ("t2", "Bash")], vec![]),
            record_with("m1", 2, vec![], vec!["t1"]),
            record_with("m2", 5, vec![], vec!["t2"]),
        ];

        let execs = link_tool_executions(&records);
        assert_eq!(execs.len(), 2);
        assert!(execs.iter().all(|e| e.result.is_some()));
        assert_eq!(execs[0].duration_ms, 2000);
        assert_eq!(execs[1].duration_ms, 5000);
    }

    #[test]
    fn test_every_matched_result_appears_exactly_once() {
        let records = vec![
            record_with("a1", 0, vec![("t1", "Read")], vec![]),
            record_with("m1", 1, vec![], vec!["t1", "ghost"]),
        ];

        let execs = link_tool_executions(&records);
        let matched: Vec<_> = execs.iter().filter(|e| e.result.is_some()).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].call.id, "t1");
    }

    #[test]
    fn test_unmatched_and_orphans() {
        let records = vec![
            record_with("a1", 0, vec![("t1", "Read"), ("t2", "Bash")], vec![]),
            record_with("m1", 1, vec![], vec!["t1", "never-called"]),
        ];

        let unmatched = find_unmatched_calls(&records);
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].id, "t2");

        let orphans = find_orphaned_results(&records);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].tool_use_id, "never-called");
    }

    #[test]
    fn test_ordering_by_start_time() {
        let records = vec![
            record_with("a2", 10, vec![("late", "Grep")], vec![]),
            record_with("a1", 0, vec![("early", "Read")], vec![]),
        ];

        let execs = link_tool_executions(&records);
        assert_eq!(execs[0].call.id, "early");
        assert_eq!(execs[1].call.id, "late");
    }

    #[test]
    fn test_group_by_tool_name() {
        let records = vec![record_with(
            "a1",
            0,
            vec![("t1", "Read"), ("t2", "Read"), ("t3", "Bash")],
            vec![],
        )];

        let groups = group_by_tool_name(&link_tool_executions(&records));
        assert_eq!(groups["Read"].len(), 2);
        assert_eq!(groups["Bash"].len(), 1);
    }
}
