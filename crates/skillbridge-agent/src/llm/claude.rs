//! Anthropic Claude API implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use skillbridge_core::config::LlmConfig;

use crate::types::{parse_claude_tool_calls, ChatMessage, ModelResponse, ModelTarget};

use super::{HttpClient, ModelBackend, DEFAULT_MAX_TOKENS};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeBackend {
    client: HttpClient,
}

impl ClaudeBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
        })
    }

    /// Split out the system prompt and map the history onto Messages API
    /// turns. Consecutive tool results share one `user` turn of
    /// `tool_result` blocks.
    pub(super) fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == "system")
            .filter_map(|m| m.content.as_deref())
            .collect();
        let system = (!system.is_empty()).then(|| system.join("\n\n"));

        let mut turns: Vec<Value> = Vec::new();
        let mut results: Vec<Value> = Vec::new();
        for msg in messages.iter().filter(|m| m.role != "system") {
            if msg.role == "tool" {
                results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id.as_deref().unwrap_or(""),
                    "content": msg.content.as_deref().unwrap_or(""),
                }));
                continue;
            }
            if !results.is_empty() {
                turns.push(json!({"role": "user", "content": std::mem::take(&mut results)}));
            }
            match msg.role.as_str() {
                "user" => turns.push(json!({
                    "role": "user",
                    "content": msg.content.as_deref().unwrap_or(""),
                })),
                "assistant" => {
                    let text = msg
                        .content
                        .as_deref()
                        .filter(|t| !t.is_empty())
                        .map(|t| json!({"type": "text", "text": t}));
                    let uses = msg.tool_calls.iter().flatten().map(|tc| {
                        json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.function.name,
                            "input": serde_json::from_str::<Value>(&tc.function.arguments)
                                .unwrap_or_else(|_| json!({})),
                        })
                    });
                    let blocks: Vec<Value> = text.into_iter().chain(uses).collect();
                    if !blocks.is_empty() {
                        turns.push(json!({"role": "assistant", "content": blocks}));
                    }
                }
                other => tracing::debug!(role = other, "message role not sent to Claude"),
            }
        }
        if !results.is_empty() {
            turns.push(json!({"role": "user", "content": results}));
        }
        (system, turns)
    }

    pub(super) fn convert_response(response: &Value) -> ModelResponse {
        let blocks = response
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let text: String = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();

        if let Some(usage) = response.get("usage") {
            tracing::debug!(
                input_tokens = usage.get("input_tokens").and_then(|v| v.as_u64()),
                output_tokens = usage.get("output_tokens").and_then(|v| v.as_u64()),
                stop_reason = response.get("stop_reason").and_then(|s| s.as_str()),
                "claude usage"
            );
        }

        ModelResponse {
            content: (!text.is_empty()).then_some(text),
            tool_calls: parse_claude_tool_calls(&blocks),
        }
    }
}

#[async_trait]
impl ModelBackend for ClaudeBackend {
    fn target(&self) -> ModelTarget {
        ModelTarget::Claude
    }

    async fn invoke(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ModelResponse> {
        let url = format!("{}/v1/messages", self.client.api_base.trim_end_matches("/v1"));

        let (system_prompt, claude_messages) = Self::convert_messages(messages);

        let mut body = json!({
            "model": self.client.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": claude_messages,
        });
        if let Some(system) = &system_prompt {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let response = self
            .client
            .post_json(
                &url,
                &[
                    ("x-api-key", self.client.api_key.as_str()),
                    ("anthropic-version", ANTHROPIC_VERSION),
                ],
                &body,
                "Claude",
            )
            .await?;
        Ok(Self::convert_response(&response))
    }
}
