//! Display sanitization for user and AI text.
//!
//! Internal markup regions are removed open-to-close before text reaches
//! a display surface or mention extraction. Token estimation always runs
//! on the unsanitized content.

use once_cell::sync::Lazy;
use regex::Regex;

use sessionlens_types::RecordContent;

static MARKUP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?s)<system-reminder>.*?</system-reminder>",
        r"(?s)<teammate-message\b[^>]*>.*?</teammate-message>",
        r"(?s)<local-command-caveat>.*?</local-command-caveat>",
        r"(?s)<command-name>.*?</command-name>",
        r"(?s)<command-message>.*?</command-message>",
        r"(?s)<command-args>.*?</command-args>",
        r"(?s)<local-command-stdout>.*?</local-command-stdout>",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

static SLASH_COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(/[a-zA-Z][\w-]*)").expect("static regex"));

static FILE_REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@((?:/|\.\.?/)[^\s,;]+|[a-zA-Z][\w./\\-]+\.\w+)").expect("static regex")
});

/// Remove internal markup regions and collapse leftover blank runs.
pub fn sanitize_content(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut result = text.to_string();
    for pattern in MARKUP_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").into_owned();
    }
    BLANK_RUN_RE.replace_all(&result, "\n\n").trim().to_string()
}

/// Extract the user-typed text from record content, sanitized for
/// display.
pub fn extract_user_text(content: &RecordContent) -> String {
    sanitize_content(&content.plain_text())
}

/// Slash commands present in user text, e.g. `/compact`, `/review`.
pub fn extract_slash_commands(text: &str) -> Vec<String> {
    SLASH_COMMAND_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `@`-mentioned file paths in user text.
pub fn extract_file_references(text: &str) -> Vec<String> {
    FILE_REFERENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
