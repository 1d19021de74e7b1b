//! OpenAI-compatible API implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use skillbridge_core::config::LlmConfig;

use crate::types::{ChatMessage, ModelResponse, ModelTarget, ToolCall};

use super::{HttpClient, ModelBackend, DEFAULT_MAX_TOKENS};

// ─── Response types ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChoiceMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

pub struct OpenAiBackend {
    client: HttpClient,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
        })
    }

    pub(super) fn request_body(model: &str, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let mut body = json!({
            "model": model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }

    pub(super) fn convert_response(response: ChatCompletionResponse) -> ModelResponse {
        if let Some(usage) = &response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "openai usage"
            );
        }
        match response.choices.into_iter().next() {
            Some(choice) => {
                tracing::debug!(finish_reason = ?choice.finish_reason, "openai choice");
                ModelResponse {
                    content: choice.message.content.filter(|c| !c.is_empty()),
                    tool_calls: choice.message.tool_calls.unwrap_or_default(),
                }
            }
            None => ModelResponse::default(),
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn target(&self) -> ModelTarget {
        ModelTarget::OpenAi
    }

    async fn invoke(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ModelResponse> {
        let url = format!("{}/chat/completions", self.client.api_base);
        let body = Self::request_body(&self.client.model, messages, tools);
        let auth = format!("Bearer {}", self.client.api_key);
        let raw = self
            .client
            .post_json(&url, &[("Authorization", auth.as_str())], &body, "OpenAI")
            .await?;
        let response: ChatCompletionResponse =
            serde_json::from_value(raw).context("Unexpected OpenAI response shape")?;
        Ok(Self::convert_response(response))
    }
}
