//! Project directory name codec.
//!
//! The agent CLI encodes a project's working directory into a flat
//! directory name by replacing path separators with hyphens:
//! `/home/wiz/AI/LLM` ↔ `-home-wiz-AI-LLM`. Composite ids may carry a
//! `::<8-hex>` suffix which is stripped for decoding and display.

use once_cell::sync::Lazy;
use regex::Regex;

static COMPOSITE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)::[0-9a-fA-F]{8}$").expect("static regex"));

/// Encode a filesystem path to a project directory name.
pub fn encode_path(path: &str) -> String {
    path.replace(['/', '\\'], "-")
}

/// Decode a project directory name to a filesystem path.
pub fn decode_path(encoded: &str) -> String {
    if encoded.is_empty() {
        return String::new();
    }
    strip_composite_suffix(encoded).replace('-', "/")
}

/// Remove a trailing `::<8-hex>` composite suffix, if present.
pub fn strip_composite_suffix(project_id: &str) -> &str {
    match COMPOSITE_SUFFIX_RE.captures(project_id) {
        Some(caps) => caps.get(1).map_or(project_id, |m| m.as_str()),
        None => project_id,
    }
}

/// Last path segment of the decoded project path, used for display.
pub fn project_display_name(project_id: &str) -> String {
    let decoded = decode_path(project_id);
    decoded
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}
