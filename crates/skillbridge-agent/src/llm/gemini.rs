//! Google Gemini `generateContent` implementation.
//!
//! Gemini has no tool-call ids: calls carry only a function name and
//! responses are matched back by name. Ids are minted here so the loop can
//! still correlate results and approvals by `call_id`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use skillbridge_core::config::LlmConfig;

use crate::types::{ChatMessage, ModelResponse, ModelTarget, ToolCall};

use super::{HttpClient, ModelBackend, DEFAULT_MAX_TOKENS};

pub struct GeminiBackend {
    client: HttpClient,
}

impl GeminiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
        })
    }

    /// Convert OpenAI-format messages to Gemini `contents`.
    /// Returns the system instruction separately.
    pub(super) fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let mut system = None;
        let mut contents: Vec<Value> = Vec::new();
        let mut pending_responses: Vec<Value> = Vec::new();

        for msg in messages {
            if msg.role != "tool" && !pending_responses.is_empty() {
                contents.push(json!({
                    "role": "user",
                    "parts": std::mem::take(&mut pending_responses)
                }));
            }

            match msg.role.as_str() {
                "system" => {
                    if let Some(ref content) = msg.content {
                        system = Some(match system {
                            Some(existing) => format!("{}\n\n{}", existing, content),
                            None => content.clone(),
                        });
                    }
                }
                "user" => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": msg.content.as_deref().unwrap_or("")}]
                    }));
                }
                "assistant" => {
                    let mut parts: Vec<Value> = Vec::new();
                    if let Some(ref text) = msg.content {
                        if !text.is_empty() {
                            parts.push(json!({"text": text}));
                        }
                    }
                    for tc in msg.tool_calls.iter().flatten() {
                        let args: Value =
                            serde_json::from_str(&tc.function.arguments).unwrap_or(json!({}));
                        parts.push(json!({
                            "functionCall": {"name": tc.function.name, "args": args}
                        }));
                    }
                    if !parts.is_empty() {
                        contents.push(json!({"role": "model", "parts": parts}));
                    }
                }
                "tool" => {
                    let raw = msg.content.as_deref().unwrap_or("");
                    // `response` must be an object.
                    let response = match serde_json::from_str::<Value>(raw) {
                        Ok(v @ Value::Object(_)) => v,
                        _ => json!({"result": raw}),
                    };
                    pending_responses.push(json!({
                        "functionResponse": {
                            "name": msg.name.as_deref().unwrap_or(""),
                            "response": response
                        }
                    }));
                }
                _ => {}
            }
        }

        if !pending_responses.is_empty() {
            contents.push(json!({"role": "user", "parts": pending_responses}));
        }

        (system, contents)
    }

    pub(super) fn convert_response(response: &Value) -> ModelResponse {
        let parts = response
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in &parts {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                text.push_str(t);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let args = call.get("args").cloned().unwrap_or(json!({}));
                let id = format!("call_{}", uuid::Uuid::new_v4().simple());
                tool_calls.push(ToolCall::new(id, name, args.to_string()));
            }
        }

        ModelResponse {
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
        }
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn target(&self) -> ModelTarget {
        ModelTarget::Gemini
    }

    async fn invoke(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ModelResponse> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.client.api_base, self.client.model
        );
        let (system, contents) = Self::convert_messages(messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": {"maxOutputTokens": DEFAULT_MAX_TOKENS},
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if !tools.is_empty() {
            body["tools"] = json!([{"functionDeclarations": tools}]);
        }

        let response = self
            .client
            .post_json(
                &url,
                &[("x-goog-api-key", self.client.api_key.as_str())],
                &body,
                "Gemini",
            )
            .await?;
        Ok(Self::convert_response(&response))
    }
}
