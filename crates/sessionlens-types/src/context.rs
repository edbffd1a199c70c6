use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Semantic category a context injection is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextCategory {
    ConfigDoc,
    MentionedFile,
    ToolOutput,
    ThinkingText,
    TaskCoordination,
    UserMessage,
}

impl ContextCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextCategory::ConfigDoc => "config-doc",
            ContextCategory::MentionedFile => "mentioned-file",
            ContextCategory::ToolOutput => "tool-output",
            ContextCategory::ThinkingText => "thinking-text",
            ContextCategory::TaskCoordination => "task-coordination",
            ContextCategory::UserMessage => "user-message",
        }
    }
}

/// One labelled slice of an injection's token total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub label: String,
    pub tokens: u64,
}

/// A unit of content contributing to the AI's context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInjection {
    pub id: String,
    pub category: ContextCategory,
    pub estimated_tokens: u64,
    pub path: String,
    pub display_name: String,
    /// Index of the chunk this injection originated in.
    pub turn_index: usize,
    pub tool_breakdown: Vec<TokenBreakdown>,
}

/// Per-chunk snapshot of accumulated context for the current phase.
///
/// Invariant: the per-category totals sum exactly to
/// `total_estimated_tokens`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub new_injections: Vec<ContextInjection>,
    pub accumulated_injections: Vec<ContextInjection>,
    pub tokens_by_category: BTreeMap<ContextCategory, u64>,
    pub total_estimated_tokens: u64,
    /// 1-based; incremented at every compaction boundary.
    pub phase_number: u32,
}
