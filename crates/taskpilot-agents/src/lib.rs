pub mod openai;
pub mod providers;
pub mod runtime;
pub mod tools;

pub use openai::OpenAiProvider;
pub use providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart,
    ToolDefinition, Usage,
};
pub use runtime::{validate_tool_schemas, window_history, AgentRuntime, MAX_HISTORY_MESSAGES};
