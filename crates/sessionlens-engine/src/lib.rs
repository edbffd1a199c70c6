mod chunks;
mod context;
mod linker;
mod sanitize;
mod subagents;
mod tokens;

pub use chunks::build_chunks;
pub use context::analyze_context;
pub use linker::{find_orphaned_results, find_unmatched_calls, group_by_tool_name, link_tool_executions};
pub use sanitize::{extract_file_references, extract_slash_commands, extract_user_text, sanitize_content};
pub use subagents::{discover_subagents, parse_subagent, resolve_subagents};
pub use tokens::{calculate_cost, estimate_content_tokens, estimate_tokens};
