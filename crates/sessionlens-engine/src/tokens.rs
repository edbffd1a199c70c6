//! Token estimation and USD cost calculation.

use serde_json::Value;

use sessionlens_types::{ContentBlock, RecordContent};

/// USD per million tokens: (prefix, input, output, cache_read, cache_create).
const MODEL_COSTS: &[(&str, f64, f64, f64, f64)] = &[
    ("claude-opus-4-6", 15.00, 75.00, 1.50, 18.75),
    ("claude-sonnet-4-5", 3.00, 15.00, 0.30, 3.75),
    ("claude-haiku-4-5", 0.80, 4.00, 0.08, 1.00),
];

/// Estimate token count with the ~4 chars per token heuristic.
/// Non-empty text always counts at least one token.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        0
    } else {
        ((text.len() / 4) as u64).max(1)
    }
}

/// Estimate tokens for record content: string content directly, block
/// lists summed over text, thinking, stringified tool input, and tool
/// result content. Unknown blocks are sized by their serialized form.
pub fn estimate_content_tokens(content: &RecordContent) -> u64 {
    match content {
        RecordContent::Text(s) => estimate_tokens(s),
        RecordContent::Blocks(blocks) => blocks.iter().map(estimate_block_tokens).sum(),
    }
}

fn estimate_block_tokens(block: &ContentBlock) -> u64 {
    match block {
        ContentBlock::Text { text } => estimate_tokens(text),
        ContentBlock::Thinking { thinking } => estimate_tokens(thinking),
        ContentBlock::ToolUse { input, .. } => {
            estimate_tokens(&serde_json::to_string(input).unwrap_or_default())
        }
        ContentBlock::ToolResult { content, .. } => estimate_result_tokens(content),
        ContentBlock::Other(value) => {
            estimate_tokens(&serde_json::to_string(value).unwrap_or_default())
        }
    }
}

/// Estimate tokens for a tool result's content: a plain string, or an
/// array of strings and `{text}` objects.
pub fn estimate_result_tokens(content: &Value) -> u64 {
    match content {
        Value::String(s) => estimate_tokens(s),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => estimate_tokens(s),
                Value::Object(map) => {
                    estimate_tokens(map.get("text").and_then(Value::as_str).unwrap_or(""))
                }
                _ => 0,
            })
            .sum(),
        _ => 0,
    }
}

/// Cost in USD for the given token counts, matched against the model
/// table by longest prefix, then by family prefix. Unknown models cost 0.
pub fn calculate_cost(
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    cache_creation_tokens: u64,
    model: &str,
) -> f64 {
    let Some((input, output, cache_read, cache_create)) = match_model(model) else {
        return 0.0;
    };

    (input_tokens as f64 * input
        + output_tokens as f64 * output
        + cache_read_tokens as f64 * cache_read
        + cache_creation_tokens as f64 * cache_create)
        / 1_000_000.0
}

fn match_model(model: &str) -> Option<(f64, f64, f64, f64)> {
    if model.is_empty() {
        return None;
    }

    // Longest matching full prefix wins
    let best = MODEL_COSTS
        .iter()
        .filter(|(prefix, ..)| model.starts_with(prefix))
        .max_by_key(|(prefix, ..)| prefix.len());
    if let Some(&(_, i, o, cr, cc)) = best {
        return Some((i, o, cr, cc));
    }

    // Family fallback: "claude-<family>-<major>" with the minor dropped
    MODEL_COSTS
        .iter()
        .find(|(prefix, ..)| {
            prefix
                .rsplit_once('-')
                .is_some_and(|(family, _)| model.starts_with(family))
        })
        .map(|&(_, i, o, cr, cc)| (i, o, cr, cc))
}
