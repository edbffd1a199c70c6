//! Notification triggers evaluated against newly-appended records.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use sessionlens_parser::read_records_from;
use sessionlens_types::{NotificationEntry, NotificationTrigger, ParsedRecord};

use crate::regex_guard::{compile_pattern, validate_pattern};

const MAX_HISTORY: usize = 200;
const MATCH_SNIPPET_CHARS: usize = 100;

/// Desktop-notification transport seam. The bus transport itself lives
/// outside the core; dispatch failures never affect matching.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, summary: &str, body: &str) -> anyhow::Result<()>;
}

/// Default sink: logs instead of raising a desktop notification.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, summary: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(summary, body, "notification");
        Ok(())
    }
}

fn default_triggers() -> Vec<NotificationTrigger> {
    vec![
        NotificationTrigger {
            id: "builtin-env-access".to_string(),
            name: ".env File Access".to_string(),
            enabled: true,
            pattern: r"\.env".to_string(),
            match_roles: vec!["user".to_string(), "assistant".to_string()],
            color: "#ef4444".to_string(),
            token_threshold: 0,
            match_errors: false,
        },
        NotificationTrigger {
            id: "builtin-tool-error".to_string(),
            name: "Tool Result Error".to_string(),
            enabled: true,
            pattern: r"(?i)error|exception|traceback".to_string(),
            match_roles: vec!["assistant".to_string()],
            color: "#f59e0b".to_string(),
            token_threshold: 0,
            match_errors: true,
        },
        NotificationTrigger {
            id: "builtin-high-tokens".to_string(),
            name: "High Token Usage (8000)".to_string(),
            enabled: true,
            pattern: String::new(),
            match_roles: Vec::new(),
            color: "#8b5cf6".to_string(),
            token_threshold: 8000,
            match_errors: false,
        },
    ]
}

pub struct NotificationMatcher {
    triggers: Vec<NotificationTrigger>,
    file_offsets: HashMap<PathBuf, u64>,
    history: VecDeque<NotificationEntry>,
    history_path: PathBuf,
    triggers_path: PathBuf,
    sink: Arc<dyn NotificationSink>,
    compiled: HashMap<String, Option<Regex>>,
    rejected_logged: HashSet<String>,
}

impl NotificationMatcher {
    /// Load triggers and history from `data_dir`, creating the built-in
    /// triggers on first run.
    pub fn new(data_dir: &Path, sink: Arc<dyn NotificationSink>) -> Self {
        let history_path = data_dir.join("notifications.json");
        let triggers_path = data_dir.join("triggers.json");

        let triggers = match std::fs::read_to_string(&triggers_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(%err, "invalid trigger file, using built-ins");
                default_triggers()
            }),
            Err(_) => {
                let defaults = default_triggers();
                persist_json(&triggers_path, &defaults);
                defaults
            }
        };

        let history: VecDeque<NotificationEntry> = std::fs::read_to_string(&history_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<NotificationEntry>>(&raw).ok())
            .map(VecDeque::from)
            .unwrap_or_default();

        Self {
            triggers,
            file_offsets: HashMap::new(),
            history,
            history_path,
            triggers_path,
            sink,
            compiled: HashMap::new(),
            rejected_logged: HashSet::new(),
        }
    }

    pub fn triggers(&self) -> &[NotificationTrigger] {
        &self.triggers
    }

    pub fn add_trigger(&mut self, name: &str, pattern: &str, color: &str) {
        self.triggers.push(NotificationTrigger {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            enabled: true,
            pattern: pattern.to_string(),
            match_roles: vec!["user".to_string(), "assistant".to_string()],
            color: color.to_string(),
            token_threshold: 0,
            match_errors: false,
        });
        persist_json(&self.triggers_path, &self.triggers);
    }

    pub fn remove_trigger(&mut self, trigger_id: &str) {
        self.triggers.retain(|t| t.id != trigger_id);
        persist_json(&self.triggers_path, &self.triggers);
    }

    pub fn set_trigger_enabled(&mut self, trigger_id: &str, enabled: bool) {
        if let Some(trigger) = self.triggers.iter_mut().find(|t| t.id == trigger_id) {
            trigger.enabled = enabled;
        }
        persist_json(&self.triggers_path, &self.triggers);
    }

    /// History, newest first.
    pub fn history(&self) -> Vec<NotificationEntry> {
        self.history.iter().rev().cloned().collect()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        persist_json(&self.history_path, &Vec::<NotificationEntry>::new());
    }

    /// Evaluate triggers against records appended since the last check.
    ///
    /// The first check of a path records its current size and fires
    /// nothing: historical content never notifies.
    pub fn check_file(&mut self, path: &Path) -> Vec<NotificationEntry> {
        let Ok(metadata) = std::fs::metadata(path) else {
            return Vec::new();
        };
        let file_size = metadata.len();

        let Some(&offset) = self.file_offsets.get(path) else {
            self.file_offsets.insert(path.to_path_buf(), file_size);
            return Vec::new();
        };

        if offset >= file_size {
            self.file_offsets.insert(path.to_path_buf(), file_size);
            return Vec::new();
        }

        let records = match read_records_from(path, offset) {
            Ok(records) => records,
            Err(err) => {
                debug!(path = %path.display(), %err, "notification check cannot read file");
                return Vec::new();
            }
        };
        self.file_offsets.insert(path.to_path_buf(), file_size);

        let mut fired = Vec::new();
        for record in &records {
            fired.extend(self.check_record(record, path));
        }
        fired
    }

    fn check_record(&mut self, record: &ParsedRecord, path: &Path) -> Vec<NotificationEntry> {
        let mut fired = Vec::new();

        for index in 0..self.triggers.len() {
            let trigger = self.triggers[index].clone();
            if !trigger.enabled {
                continue;
            }

            if trigger.token_threshold > 0
                && let Some(usage) = &record.usage
                && usage.output_tokens >= trigger.token_threshold
            {
                let text = format!("Output tokens: {}", usage.output_tokens);
                fired.push(self.fire(&trigger, &text, path));
                continue;
            }

            if trigger.pattern.is_empty() {
                continue;
            }
            let Some(regex) = self.pattern_for(&trigger.pattern) else {
                continue;
            };

            let text = matchable_text(record, &trigger);
            if text.is_empty() {
                continue;
            }

            if let Some(found) = regex.find(&text) {
                let snippet: String =
                    found.as_str().chars().take(MATCH_SNIPPET_CHARS).collect();
                fired.push(self.fire(&trigger, &snippet, path));
            }
        }

        fired
    }

    fn pattern_for(&mut self, pattern: &str) -> Option<Regex> {
        if let Some(compiled) = self.compiled.get(pattern) {
            return compiled.clone();
        }

        let compiled = match validate_pattern(pattern) {
            Ok(()) => compile_pattern(pattern),
            Err(reason) => {
                if self.rejected_logged.insert(pattern.to_string()) {
                    warn!(pattern, reason, "rejecting trigger pattern");
                }
                None
            }
        };
        self.compiled.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    fn fire(
        &mut self,
        trigger: &NotificationTrigger,
        matched_text: &str,
        path: &Path,
    ) -> NotificationEntry {
        let entry = NotificationEntry {
            id: Uuid::new_v4().to_string(),
            trigger_id: trigger.id.clone(),
            trigger_name: trigger.name.clone(),
            trigger_color: trigger.color.clone(),
            matched_text: matched_text.to_string(),
            file_path: path.display().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        self.history.push_back(entry.clone());
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        let snapshot: Vec<NotificationEntry> = self.history.iter().cloned().collect();
        persist_json(&self.history_path, &snapshot);

        // Fire-and-forget dispatch: a failing desktop bus must not affect
        // matching or history.
        let sink = Arc::clone(&self.sink);
        let summary = trigger.name.clone();
        let body = matched_text.to_string();
        std::thread::spawn(move || {
            if let Err(err) = sink.notify(&summary, &body) {
                debug!(%err, "notification dispatch failed");
            }
        });

        entry
    }
}

fn matchable_text(record: &ParsedRecord, trigger: &NotificationTrigger) -> String {
    let role = if record.role.is_empty() {
        match record.kind {
            sessionlens_types::RecordKind::User => "user",
            sessionlens_types::RecordKind::Assistant => "assistant",
            _ => "system",
        }
        .to_string()
    } else {
        record.role.clone()
    };

    let mut text = if trigger.match_roles.is_empty() || trigger.match_roles.contains(&role) {
        record.content.plain_text()
    } else {
        String::new()
    };

    if trigger.match_errors {
        for result in &record.tool_results {
            if result.is_error {
                let error_text = result.text();
                if !error_text.is_empty() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&error_text);
                }
            }
        }
    }

    text
}

fn persist_json<T: serde::Serialize>(path: &Path, value: &T) {
    if let Some(parent) = path.parent()
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        warn!(%err, "cannot create data dir");
        return;
    }
    match serde_json::to_string(value) {
        Ok(json) => {
            if let Err(err) = std::fs::write(path, json) {
                warn!(path = %path.display(), %err, "cannot persist state");
            }
        }
        Err(err) => warn!(%err, "cannot serialize state"),
    }
}
