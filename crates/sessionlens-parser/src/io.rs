//! File-level record streaming.
//!
//! I/O errors surface to the caller; malformed lines never do.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};

use sessionlens_types::ParsedRecord;

use crate::parser::parse_line;

/// How many leading lines the first-user-message scan examines.
const FIRST_MESSAGE_SCAN_LINES: usize = 100;

/// Length cap for first-message snippets, in characters.
const SNIPPET_CHARS: usize = 200;

/// Parse an entire session file in order of appearance.
pub fn read_records(path: &Path) -> Result<Vec<ParsedRecord>> {
    read_records_from(path, 0)
}

/// Parse a session file starting at a byte offset.
///
/// Used by incremental tail-follow: the caller tracks the offset of the
/// last fully-parsed byte and re-reads only the appended suffix.
pub fn read_records_from(path: &Path, offset: u64) -> Result<Vec<ParsedRecord>> {
    let mut file =
        File::open(path).with_context(|| format!("open session file {}", path.display()))?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek to {offset} in {}", path.display()))?;
    }

    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }

        // Log writers are not guaranteed to emit valid UTF-8
        let line = String::from_utf8_lossy(&buf);
        if let Some(record) = parse_line(&line) {
            records.push(record);
        }
    }

    Ok(records)
}

/// Extract the first real user message from a session file, reading at
/// most the leading ~100 lines. Returns an empty string when none is
/// found.
pub fn first_user_message(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("open session file {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    for _ in 0..FIRST_MESSAGE_SCAN_LINES {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let Some(record) = parse_line(&line) else {
            continue;
        };
        if !record.is_real_user() {
            continue;
        }

        let text = record.content.plain_text();
        let text = text.trim();
        if !text.is_empty() {
            return Ok(truncate_chars(text, SNIPPET_CHARS));
        }
    }

    Ok(String::new())
}

/// Lightweight whole-file scan used when populating session summaries.
#[derive(Debug, Default, Clone)]
pub struct SummaryScan {
    pub message_count: u64,
    /// Last non-empty git branch observed on any record.
    pub git_branch: String,
}

/// Count parseable records and capture the last observed git branch.
pub fn scan_summary(path: &Path) -> Result<SummaryScan> {
    let file =
        File::open(path).with_context(|| format!("open session file {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut scan = SummaryScan::default();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        if let Some(record) = parse_line(&line) {
            scan.message_count += 1;
            if !record.git_branch.is_empty() {
                scan.git_branch = record.git_branch;
            }
        }
    }

    Ok(scan)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
