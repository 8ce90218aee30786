use async_trait::async_trait;
use taskpilot_common::{Result, UserId};

pub mod history;
pub mod tasks;

pub use history::ClearChatHistory;
pub use tasks::{
    AddTask, CompleteTask, DeleteAllTasks, DeleteTask, ListAllTasks, ListTasks, UpdateTask,
};

/// Per-call execution context. The authenticated user id is injected here by
/// the runtime; it never appears in the model-visible argument payload.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: UserId,
}

/// Result of a tool execution, fed back into the conversation transcript.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A named operation the model can invoke during the planning stage.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema for the argument payload, advertised to the model.
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput>;
}
