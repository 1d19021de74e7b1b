pub mod agent_loop;
pub mod approval;
pub mod builtin;
pub mod llm;
pub mod prompt;
pub mod schema;
pub mod types;

pub use agent_loop::{
    AgentLoop, ConversationTurn, LoopState, PendingApproval, StopReason, Turn, TurnOutcome, TurnRecord,
};
pub use approval::{approval_channel, ApprovalDecision, ApprovalError, ApprovalSignal};
pub use llm::{backend_from_config, ModelBackend};
pub use schema::{SchemaCache, SchemaCacheEntry};
pub use types::{
    ChatMessage, EventSink, ModelResponse, ModelTarget, SilentEventSink, TerminalEventSink, ToolCall,
    UnsupportedTargetError,
};
