//! Cross-session substring search.

use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use tracing::debug;

use sessionlens_core::project_display_name;
use sessionlens_parser::read_records;
use sessionlens_types::{ParsedRecord, SearchResult};

/// Characters of context kept on each side of a match.
const CONTEXT_WINDOW: usize = 50;

pub struct SearchEngine {
    projects_root: PathBuf,
}

impl SearchEngine {
    pub fn new(projects_root: impl Into<PathBuf>) -> Self {
        Self { projects_root: projects_root.into() }
    }

    /// Search project names (no project given) or session content within
    /// one project. Returns a single batch; an empty query yields an
    /// empty batch.
    pub fn search(&self, query: &str, project_id: Option<&str>) -> Vec<SearchResult> {
        if query.is_empty() {
            return Vec::new();
        }
        let Some(pattern) = literal_pattern(query) else {
            return Vec::new();
        };

        match project_id {
            None => self.search_project_names(&pattern),
            Some(project_id) => self.search_project_sessions(&pattern, project_id),
        }
    }

    fn search_project_names(&self, pattern: &Regex) -> Vec<SearchResult> {
        let Ok(entries) = std::fs::read_dir(&self.projects_root) else {
            return Vec::new();
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        let mut results = Vec::new();
        for dir in dirs {
            let project_id = dir.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
            let display_name = project_display_name(&project_id);

            if let Some(found) = pattern.find(&display_name) {
                let mtime = dir
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);

                results.push(SearchResult {
                    session_id: String::new(),
                    project_id,
                    session_title: display_name.clone(),
                    matched_text: found.as_str().to_string(),
                    context: context_window(&display_name, found.start(), found.end()),
                    message_type: "project".to_string(),
                    timestamp: mtime,
                    message_index: 0,
                });
            }
        }
        results
    }

    fn search_project_sessions(&self, pattern: &Regex, project_id: &str) -> Vec<SearchResult> {
        let project_dir = self.projects_root.join(project_id);
        let Ok(entries) = std::fs::read_dir(&project_dir) else {
            return Vec::new();
        };

        // Newest sessions first for relevance
        let mut files: Vec<(PathBuf, std::time::SystemTime)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .filter_map(|p| {
                let mtime = p.metadata().and_then(|m| m.modified()).ok()?;
                Some((p, mtime))
            })
            .collect();
        files.sort_by(|a, b| b.1.cmp(&a.1));

        let mut results = Vec::new();
        for (file, _) in files {
            let session_id =
                file.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
            let records = match read_records(&file) {
                Ok(records) => records,
                Err(err) => {
                    debug!(path = %file.display(), %err, "skipping unreadable session");
                    continue;
                }
            };

            let mut session_title = String::new();
            for (index, record) in records.iter().enumerate() {
                let text = searchable_text(record);
                if text.is_empty() {
                    continue;
                }

                if session_title.is_empty() && record.role == "user" && !record.is_meta {
                    session_title = text.chars().take(100).collect();
                }

                if let Some(found) = pattern.find(&text) {
                    results.push(SearchResult {
                        session_id: session_id.clone(),
                        project_id: project_id.to_string(),
                        session_title: if session_title.is_empty() {
                            session_id.clone()
                        } else {
                            session_title.clone()
                        },
                        matched_text: found.as_str().to_string(),
                        context: context_window(&text, found.start(), found.end()),
                        message_type: if record.role.is_empty() {
                            "system".to_string()
                        } else {
                            record.role.clone()
                        },
                        timestamp: record.timestamp.timestamp() as f64,
                        message_index: index,
                    });
                }
            }
        }
        results
    }
}

/// Case-insensitive literal matcher for the query.
fn literal_pattern(query: &str) -> Option<Regex> {
    RegexBuilder::new(&regex::escape(query)).case_insensitive(true).build().ok()
}

/// Text a search may match: user/assistant/human non-meta records, from
/// string content or text blocks.
fn searchable_text(record: &ParsedRecord) -> String {
    if record.is_meta {
        return String::new();
    }
    if !matches!(record.role.as_str(), "user" | "assistant" | "human") {
        return String::new();
    }
    record.content.plain_text()
}

/// Slice `text` around a match span with up to `CONTEXT_WINDOW` chars on
/// each side, respecting char boundaries.
fn context_window(text: &str, start: usize, end: usize) -> String {
    let window_start = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let window_end = text[end..]
        .char_indices()
        .nth(CONTEXT_WINDOW)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    text[window_start..window_end].to_string()
}
