use serde_json::json;
use std::sync::Arc;
use taskpilot_common::Result;
use taskpilot_db::ChatStore;
use tokio::sync::Mutex;

use async_trait::async_trait;

use crate::tools::{Tool, ToolContext, ToolOutput};

/// Tool wiping the calling user's stored conversation history.
pub struct ClearChatHistory {
    store: Arc<Mutex<ChatStore>>,
}

impl ClearChatHistory {
    pub fn new(store: Arc<Mutex<ChatStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ClearChatHistory {
    fn name(&self) -> &'static str {
        "clear_chat_history"
    }

    fn description(&self) -> &'static str {
        "Clear the user's entire chat history across all conversations."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, context: &ToolContext, _args: serde_json::Value) -> Result<ToolOutput> {
        let store = self.store.lock().await;
        let count = store.clear_history(&context.user_id)?;

        Ok(ToolOutput::success(format!(
            "Cleared {count} messages from your history."
        )))
    }
}
