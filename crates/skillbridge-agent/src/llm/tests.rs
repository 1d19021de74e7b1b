//! Tests for the model backends.

use super::openai::ChatCompletionResponse;
use super::*;
use crate::schema::tests::descriptor;
use crate::types::ToolCall;
use serde_json::json;

fn config(target: Option<&str>, model: &str, api_base: &str) -> LlmConfig {
    LlmConfig {
        target: target.map(str::to_string),
        api_base: api_base.to_string(),
        api_key: "sk-test".to_string(),
        model: model.to_string(),
    }
}

#[test]
fn test_backend_from_config_explicit_target() {
    let backend = backend_from_config(&config(Some("gemini"), "gpt-4o", "https://example.com")).unwrap();
    assert_eq!(backend.target(), ModelTarget::Gemini);
}

#[test]
fn test_backend_from_config_detects_target() {
    let backend =
        backend_from_config(&config(None, "claude-3-5-sonnet-latest", "https://api.anthropic.com")).unwrap();
    assert_eq!(backend.target(), ModelTarget::Claude);

    let backend = backend_from_config(&config(None, "deepseek-chat", "https://api.deepseek.com/v1")).unwrap();
    assert_eq!(backend.target(), ModelTarget::OpenAi);
}

#[test]
fn test_backend_from_config_unknown_target() {
    let err = match backend_from_config(&config(Some("llama"), "x", "https://example.com")) {
        Ok(_) => panic!("unknown target accepted"),
        Err(e) => e,
    };
    assert!(err.downcast_ref::<crate::types::UnsupportedTargetError>().is_some());
}

#[test]
fn test_backend_render_uses_its_format() {
    let d = descriptor("sample-converter", "Convert text case");
    let claude = backend_for(ModelTarget::Claude, &config(None, "claude-3", "https://api.anthropic.com")).unwrap();
    assert!(claude.render(&d).get("input_schema").is_some());
    let openai = backend_for(ModelTarget::OpenAi, &config(None, "gpt-4o", "https://api.openai.com/v1")).unwrap();
    assert_eq!(openai.render(&d)["type"], "function");
}

#[test]
fn test_openai_request_body() {
    let tools = vec![json!({"type": "function", "function": {"name": "t"}})];
    let body = OpenAiBackend::request_body("gpt-4o", &[ChatMessage::user("hi")], &tools);
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["tools"][0]["function"]["name"], "t");

    let body = OpenAiBackend::request_body("gpt-4o", &[ChatMessage::user("hi")], &[]);
    assert!(body.get("tools").is_none());
}

#[test]
fn test_openai_convert_response_with_tool_calls() {
    let raw = json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": {
                        "name": "sample-converter",
                        "arguments": "{\"input_text\":\"hello\",\"operation\":\"uppercase\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    });
    let parsed: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
    let response = OpenAiBackend::convert_response(parsed);
    assert!(response.content.is_none());
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_abc");
    assert_eq!(response.tool_calls[0].function.name, "sample-converter");
}

#[test]
fn test_openai_convert_response_text_only() {
    let raw = json!({
        "choices": [{"message": {"role": "assistant", "content": "HELLO"}, "finish_reason": "stop"}]
    });
    let parsed: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
    let response = OpenAiBackend::convert_response(parsed);
    assert_eq!(response, ModelResponse::text("HELLO"));
}

#[test]
fn test_convert_messages_for_claude_basic() {
    let messages = vec![
        ChatMessage::system("You are helpful."),
        ChatMessage::user("Hello"),
        ChatMessage::assistant("Hi there!"),
    ];

    let (system, claude_msgs) = ClaudeBackend::convert_messages(&messages);

    assert_eq!(system, Some("You are helpful.".to_string()));
    assert_eq!(claude_msgs.len(), 2); // user + assistant (system extracted)

    assert_eq!(claude_msgs[0]["role"], "user");
    assert_eq!(claude_msgs[0]["content"], "Hello");

    assert_eq!(claude_msgs[1]["role"], "assistant");
    let content = claude_msgs[1]["content"].as_array().unwrap();
    assert_eq!(content[0]["type"], "text");
    assert_eq!(content[0]["text"], "Hi there!");
}

#[test]
fn test_convert_messages_for_claude_tool_calls() {
    let tool_call = ToolCall::new("tc_123", "file-tool", r#"{"path": "test.txt"}"#);

    let messages = vec![
        ChatMessage::system("System prompt"),
        ChatMessage::user("Read the file"),
        ChatMessage::assistant_with_tool_calls(Some("Let me read that."), vec![tool_call]),
        ChatMessage::tool_result("tc_123", "file-tool", "File contents here"),
    ];

    let (system, claude_msgs) = ClaudeBackend::convert_messages(&messages);

    assert!(system.is_some());
    assert_eq!(claude_msgs.len(), 3); // user, assistant (with tool_use), user (with tool_result)

    let assistant_content = claude_msgs[1]["content"].as_array().unwrap();
    assert_eq!(assistant_content.len(), 2);
    assert_eq!(assistant_content[0]["type"], "text");
    assert_eq!(assistant_content[1]["type"], "tool_use");
    assert_eq!(assistant_content[1]["id"], "tc_123");
    assert_eq!(assistant_content[1]["input"]["path"], "test.txt");

    let tool_result_msg = &claude_msgs[2];
    assert_eq!(tool_result_msg["role"], "user");
    let result_content = tool_result_msg["content"].as_array().unwrap();
    assert_eq!(result_content[0]["type"], "tool_result");
    assert_eq!(result_content[0]["tool_use_id"], "tc_123");
    assert_eq!(result_content[0]["content"], "File contents here");
}

#[test]
fn test_convert_messages_for_claude_multiple_tool_results() {
    let messages = vec![
        ChatMessage::system("sys"),
        ChatMessage::user("do both"),
        ChatMessage::assistant_with_tool_calls(
            None,
            vec![ToolCall::new("tc_1", "tool_a", "{}"), ToolCall::new("tc_2", "tool_b", "{}")],
        ),
        ChatMessage::tool_result("tc_1", "tool_a", "result a"),
        ChatMessage::tool_result("tc_2", "tool_b", "result b"),
    ];

    let (_, claude_msgs) = ClaudeBackend::convert_messages(&messages);

    // Multiple tool results should be batched into one user message
    assert_eq!(claude_msgs.len(), 3);

    let result_content = claude_msgs[2]["content"].as_array().unwrap();
    assert_eq!(result_content.len(), 2);
    assert_eq!(result_content[0]["tool_use_id"], "tc_1");
    assert_eq!(result_content[1]["tool_use_id"], "tc_2");
}

#[test]
fn test_convert_claude_response_with_tool_use() {
    let response = json!({
        "id": "msg_456",
        "type": "message",
        "role": "assistant",
        "content": [
            {"type": "text", "text": "Let me read that file."},
            {
                "type": "tool_use",
                "id": "toolu_01",
                "name": "file-tool",
                "input": {"path": "hello.txt"}
            }
        ],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 50, "output_tokens": 30}
    });

    let result = ClaudeBackend::convert_response(&response);

    assert_eq!(result.content, Some("Let me read that file.".to_string()));
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(result.tool_calls[0].id, "toolu_01");
    assert_eq!(result.tool_calls[0].function.name, "file-tool");
    assert!(result.tool_calls[0].function.arguments.contains("hello.txt"));
}

#[test]
fn test_convert_claude_response_text_only() {
    let response = json!({
        "content": [{"type": "text", "text": "Here is the result."}],
        "stop_reason": "end_turn"
    });
    let result = ClaudeBackend::convert_response(&response);
    assert_eq!(result, ModelResponse::text("Here is the result."));
}

#[test]
fn test_convert_messages_for_gemini() {
    let messages = vec![
        ChatMessage::system("sys"),
        ChatMessage::user("convert hello"),
        ChatMessage::assistant_with_tool_calls(
            None,
            vec![ToolCall::new("call_1", "sample-converter", r#"{"input_text":"hello"}"#)],
        ),
        ChatMessage::tool_result("call_1", "sample-converter", r#"{"state":"success","stdout":"HELLO"}"#),
        ChatMessage::tool_result("call_2", "other", "plain text"),
    ];

    let (system, contents) = GeminiBackend::convert_messages(&messages);

    assert_eq!(system.as_deref(), Some("sys"));
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["parts"][0]["text"], "convert hello");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "sample-converter");
    assert_eq!(contents[1]["parts"][0]["functionCall"]["args"]["input_text"], "hello");

    let parts = contents[2]["parts"].as_array().unwrap();
    assert_eq!(contents[2]["role"], "user");
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["functionResponse"]["name"], "sample-converter");
    assert_eq!(parts[0]["functionResponse"]["response"]["stdout"], "HELLO");
    assert_eq!(parts[1]["functionResponse"]["response"]["result"], "plain text");
}

#[test]
fn test_convert_gemini_response_mints_call_ids() {
    let response = json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"functionCall": {"name": "sample-converter", "args": {"input_text": "a"}}},
                    {"functionCall": {"name": "sample-converter", "args": {"input_text": "b"}}}
                ]
            }
        }]
    });
    let result = GeminiBackend::convert_response(&response);
    assert!(result.content.is_none());
    assert_eq!(result.tool_calls.len(), 2);
    assert!(result.tool_calls[0].id.starts_with("call_"));
    assert_ne!(result.tool_calls[0].id, result.tool_calls[1].id);
    let args: serde_json::Value = serde_json::from_str(&result.tool_calls[1].function.arguments).unwrap();
    assert_eq!(args["input_text"], "b");
}

#[test]
fn test_convert_gemini_response_text() {
    let response = json!({
        "candidates": [{"content": {"parts": [{"text": "Done."}]}}]
    });
    assert_eq!(GeminiBackend::convert_response(&response), ModelResponse::text("Done."));
}
