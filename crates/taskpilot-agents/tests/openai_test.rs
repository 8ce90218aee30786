use serde_json::json;
use taskpilot_agents::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, MessagePart, OpenAiProvider,
    ToolDefinition,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_openai_completion() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "Hello there!",
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 9,
            "completion_tokens": 12,
            "total_tokens": 21
        }
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let request = LlmRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![ChatMessage {
            role: ChatRole::User,
            content: MessagePart::Text("Hello".to_string()),
        }],
        system: Some("You are a helpful assistant.".to_string()),
        max_tokens: None,
        temperature: None,
        tools: vec![],
    };

    let response = provider.complete(&request).await.unwrap();

    assert_eq!(response.content.len(), 1);
    match &response.content[0] {
        ContentBlock::Text { text } => assert_eq!(text, "Hello there!"),
        _ => panic!("Expected text content"),
    }
    assert_eq!(response.usage.as_ref().unwrap().input_tokens, 9);
}

#[tokio::test]
async fn test_openai_tool_use() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_abc123",
                    "type": "function",
                    "function": {
                        "name": "add_task",
                        "arguments": "{\"title\": \"buy milk\", \"priority\": \"high\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {
            "prompt_tokens": 9,
            "completion_tokens": 12,
            "total_tokens": 21
        }
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{
                "type": "function",
                "function": {"name": "add_task"}
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let request = LlmRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![ChatMessage {
            role: ChatRole::User,
            content: MessagePart::Text("add buy milk to my list".to_string()),
        }],
        system: None,
        max_tokens: None,
        temperature: None,
        tools: vec![ToolDefinition {
            name: "add_task".to_string(),
            description: "Add a new task".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"}
                }
            }),
        }],
    };

    let response = provider.complete(&request).await.unwrap();

    assert_eq!(response.content.len(), 1);
    match &response.content[0] {
        ContentBlock::ToolUse { id, name, input } => {
            assert_eq!(id, "call_abc123");
            assert_eq!(name, "add_task");
            assert_eq!(input["title"], "buy milk");
            assert_eq!(input["priority"], "high");
        }
        _ => panic!("Expected tool use"),
    }
    assert_eq!(response.stop_reason.as_deref(), Some("tool_calls"));
}

#[tokio::test]
async fn test_openai_malformed_tool_arguments_degrade_to_string() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-123",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_bad",
                    "type": "function",
                    "function": {
                        "name": "add_task",
                        "arguments": "{title: buy milk"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let request = LlmRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![ChatMessage::user("add buy milk")],
        system: None,
        max_tokens: None,
        temperature: None,
        tools: vec![],
    };

    let response = provider.complete(&request).await.unwrap();

    match &response.content[0] {
        ContentBlock::ToolUse { input, .. } => {
            assert!(input.is_string(), "malformed arguments become a string payload");
        }
        _ => panic!("Expected tool use"),
    }
}

#[tokio::test]
async fn test_openai_tool_result_round_trip() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-456",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "Done, buy milk is on your list."
            },
            "finish_reason": "stop"
        }]
    });

    // The tool message must serialize with role "tool" and the originating
    // call id so the endpoint can match it to the assistant's tool_calls.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": "add buy milk"},
                {"role": "assistant", "tool_calls": [{"id": "call_abc123"}]},
                {"role": "tool", "tool_call_id": "call_abc123", "content": "Task 'buy milk' added."}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let request = LlmRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![
            ChatMessage::user("add buy milk"),
            ChatMessage {
                role: ChatRole::Assistant,
                content: MessagePart::Parts(vec![ContentBlock::ToolUse {
                    id: "call_abc123".to_string(),
                    name: "add_task".to_string(),
                    input: json!({"title": "buy milk"}),
                }]),
            },
            ChatMessage {
                role: ChatRole::Tool,
                content: MessagePart::Parts(vec![ContentBlock::ToolResult {
                    tool_use_id: "call_abc123".to_string(),
                    content: "Task 'buy milk' added.".to_string(),
                }]),
            },
        ],
        system: None,
        max_tokens: None,
        temperature: None,
        tools: vec![],
    };

    let response = provider.complete(&request).await.unwrap();
    match &response.content[0] {
        ContentBlock::Text { text } => assert_eq!(text, "Done, buy milk is on your list."),
        _ => panic!("Expected text content"),
    }
}

#[tokio::test]
async fn test_openai_api_error_surfaces() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })),
        )
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("bad-key".to_string(), Some(mock_server.uri()));
    let request = LlmRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![ChatMessage::user("hi")],
        system: None,
        max_tokens: None,
        temperature: None,
        tools: vec![],
    };

    let err = provider.complete(&request).await.unwrap_err();
    assert!(err.to_string().contains("Incorrect API key"));
}

#[tokio::test]
async fn test_openai_health_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    assert!(provider.health_check().await.unwrap());
}
