use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use taskpilot_common::{Error, Result, UserId};
use tracing::{debug, warn};

use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart,
    ToolDefinition,
};
use crate::tools::{Tool, ToolContext, ToolOutput};

/// How many trailing history messages are replayed to the model each turn.
pub const MAX_HISTORY_MESSAGES: usize = 10;

const SYSTEM_PROMPT: &str = "You are a brief, helpful Todo Assistant. Use the provided tools \
to manage tasks. The user's identity is handled for you. NEVER mention technical details or \
IDs. If the user says hi, just say hi back.";

const MISSING_CREDENTIAL_REPLY: &str =
    "Error: the LLM API key is not configured correctly on the server.";

const PLANNING_FAILURE_REPLY: &str = "I encountered an issue. Please try again.";

/// Keep only the most recent `max` messages of a conversation transcript.
pub fn window_history(history: &[ChatMessage], max: usize) -> &[ChatMessage] {
    let start = history.len().saturating_sub(max);
    &history[start..]
}

/// Tool-calling conversation loop: plan with tools, execute each call in
/// order, then synthesize a final reply from the tool results.
pub struct AgentRuntime {
    provider: Arc<dyn LlmProvider>,
    api_key: String,
    model: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl AgentRuntime {
    pub fn new(provider: Arc<dyn LlmProvider>, api_key: String, model: String) -> Self {
        Self {
            provider,
            api_key,
            model,
            tools: Vec::new(),
        }
    }

    /// Register a tool. Names must be unique within a runtime.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            return Err(Error::Agent(format!(
                "tool '{}' is already registered",
                tool.name()
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    fn credential_is_usable(&self) -> bool {
        !self.api_key.is_empty() && !self.api_key.contains("your_api_key")
    }

    /// Run one full conversation turn and return the assistant's reply text.
    ///
    /// `history` is the prior transcript in chronological order; it is
    /// windowed to the last [`MAX_HISTORY_MESSAGES`] entries before being
    /// replayed to the model.
    pub async fn process_message(
        &self,
        user_id: &UserId,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        if !self.credential_is_usable() {
            return Ok(MISSING_CREDENTIAL_REPLY.to_string());
        }

        let mut messages: Vec<ChatMessage> =
            window_history(history, MAX_HISTORY_MESSAGES).to_vec();
        messages.push(ChatMessage::user(message));

        let planning_request = LlmRequest {
            model: self.model.clone(),
            messages: messages.clone(),
            system: Some(SYSTEM_PROMPT.to_string()),
            max_tokens: None,
            temperature: None,
            tools: self.tool_definitions(),
        };

        let planning = match self.provider.complete(&planning_request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("planning request failed: {e}");
                return Ok(PLANNING_FAILURE_REPLY.to_string());
            }
        };

        let tool_uses: Vec<(String, String, serde_json::Value)> = planning
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        if tool_uses.is_empty() {
            return Ok(extract_text(&planning));
        }

        // Replay the assistant's tool-call turn, then one tool message per
        // call, exactly as the wire protocol expects.
        messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: MessagePart::Parts(planning.content.clone()),
        });

        let context = ToolContext {
            user_id: user_id.clone(),
        };

        for (call_id, name, input) in tool_uses {
            // Non-object payloads (including malformed-JSON fallbacks) are
            // treated as an empty argument set.
            let args = if input.is_object() { input } else { json!({}) };

            debug!(tool = %name, "executing tool call");

            let output = match self.find_tool(&name) {
                Some(tool) => match tool.execute(&context, args).await {
                    Ok(output) => output,
                    Err(e) => ToolOutput::error(format!("Error: {e}")),
                },
                None => ToolOutput::success("Tool not found."),
            };

            messages.push(ChatMessage {
                role: ChatRole::Tool,
                content: MessagePart::Parts(vec![ContentBlock::ToolResult {
                    tool_use_id: call_id,
                    content: output.content,
                }]),
            });
        }

        let synthesis_request = LlmRequest {
            model: self.model.clone(),
            messages,
            system: Some(SYSTEM_PROMPT.to_string()),
            max_tokens: None,
            temperature: None,
            tools: Vec::new(),
        };

        let synthesis = self.provider.complete(&synthesis_request).await?;
        Ok(extract_text(&synthesis))
    }
}

fn extract_text(response: &LlmResponse) -> String {
    response
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Verify that every registered tool advertises an object schema. Used at
/// startup to catch wiring mistakes early.
pub fn validate_tool_schemas(tools: &[ToolDefinition]) -> Result<()> {
    let mut seen = HashSet::new();
    for tool in tools {
        if !seen.insert(tool.name.as_str()) {
            return Err(Error::Agent(format!("duplicate tool name '{}'", tool.name)));
        }
        if tool.input_schema.get("type").and_then(|t| t.as_str()) != Some("object") {
            return Err(Error::Agent(format!(
                "tool '{}' schema must be an object",
                tool.name
            )));
        }
    }
    Ok(())
}
