//! Trigger pattern validation and bounded compilation.
//!
//! The `regex` crate guarantees linear-time matching, so the evaluation
//! time bound reduces to rejecting pathological patterns up front and
//! capping the compiled program size.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

pub const MAX_PATTERN_LENGTH: usize = 100;

/// Compiled-program size cap, in bytes.
const COMPILED_SIZE_LIMIT: usize = 1 << 20;

static NESTED_QUANTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+*?]\??[+*?]|(?:\{[^}]+\})[+*?]").expect("static regex"));

/// Validate a trigger pattern. Returns the rejection reason, if any.
///
/// Rejected: empty patterns, patterns over 100 chars, unbalanced
/// brackets (escape-aware), nested quantifiers, and anything the engine
/// refuses to compile.
pub fn validate_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() {
        return Err("pattern is empty".to_string());
    }
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(format!("pattern exceeds {MAX_PATTERN_LENGTH} characters"));
    }
    if !brackets_balanced(pattern) {
        return Err("unbalanced brackets or parentheses".to_string());
    }
    if NESTED_QUANTIFIER_RE.is_match(pattern) {
        return Err("nested quantifiers detected".to_string());
    }

    match compile_pattern(pattern) {
        Some(_) => Ok(()),
        None => Err("invalid regex".to_string()),
    }
}

/// Compile a pattern with the size cap applied. None on failure.
pub fn compile_pattern(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern).size_limit(COMPILED_SIZE_LIMIT).build().ok()
}

fn brackets_balanced(pattern: &str) -> bool {
    let mut stack: Vec<char> = Vec::new();
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                // Escaped character: not a bracket
                chars.next();
            }
            '(' | '[' => stack.push(ch),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            _ => {}
        }
    }

    stack.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_patterns() {
        assert!(validate_pattern(r"\.env").is_ok());
        assert!(validate_pattern(r"(?i)error|exception|traceback").is_ok());
        assert!(validate_pattern(r"[a-z]+\d{2,4}").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(validate_pattern("").is_err());
    }

    #[test]
    fn test_rejects_overlong() {
        assert!(validate_pattern(&"a".repeat(101)).is_err());
        assert!(validate_pattern(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn test_rejects_unbalanced() {
        assert!(validate_pattern("(abc").is_err());
        assert!(validate_pattern("abc)").is_err());
        assert!(validate_pattern("[abc").is_err());
        assert!(validate_pattern("a(b[c)]").is_err());
    }

    #[test]
    fn test_escaped_brackets_are_fine() {
        assert!(validate_pattern(r"\(unclosed").is_ok());
        assert!(validate_pattern(r"\[x\]").is_ok());
    }

    #[test]
    fn test_rejects_nested_quantifiers() {
        assert!(validate_pattern("a*+").is_err());
        assert!(validate_pattern("a++").is_err());
        assert!(validate_pattern(r"a{2}*").is_err());
    }

    #[test]
    fn test_compile_pattern() {
        assert!(compile_pattern(r"\d+").is_some());
        assert!(compile_pattern(r"(").is_none());
    }
}
