mod chunk;
mod context;
mod notification;
mod process;
mod record;
mod session;

pub use chunk::{AiStatus, Chunk, ChunkKind, ChunkMetrics, ChunkPayload, ToolExecution};
pub use context::{ContextCategory, ContextInjection, ContextStats, TokenBreakdown};
pub use notification::{NotificationEntry, NotificationTrigger, SearchResult};
pub use process::SubagentProcess;
pub use record::{ContentBlock, ParsedRecord, RecordContent, RecordKind, TokenUsage, ToolCall, ToolResult};
pub use session::{Project, Session};
