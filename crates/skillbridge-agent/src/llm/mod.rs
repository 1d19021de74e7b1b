//! Model backends for chat completions with tool calling.
//!
//! Three API formats, one capability interface:
//!   - **OpenAI-compatible**: `/chat/completions` (GPT-4, DeepSeek, Qwen, etc.)
//!   - **Claude Native**: `/v1/messages` (Anthropic Claude)
//!   - **Gemini**: `/models/{model}:generateContent`
//!
//! The loop only sees [`ModelBackend`]; adding a model family is one more
//! implementation, never a change to the loop.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use skillbridge_core::config::LlmConfig;
use skillbridge_core::SkillDescriptor;

use crate::schema;
use crate::types::{ChatMessage, ModelResponse, ModelTarget};

mod claude;
mod gemini;
mod openai;

pub use claude::ClaudeBackend;
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;

#[cfg(test)]
mod tests;

/// Completion budget per model call.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Capability interface of a model family.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn target(&self) -> ModelTarget;

    /// Tool declaration for this backend's wire format.
    fn render(&self, descriptor: &SkillDescriptor) -> Value {
        schema::render(descriptor, self.target())
    }

    /// One model round trip. `tools` are declarations produced by `render`.
    async fn invoke(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<ModelResponse>;
}

/// Shared HTTP plumbing of the concrete backends.
pub(crate) struct HttpClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl HttpClient {
    pub(crate) fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// POST a JSON body and return the JSON reply; non-2xx is an error.
    pub(crate) async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
        label: &str,
    ) -> Result<Value> {
        let mut req = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("{} API request failed", label))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} API error ({}): {}", label, status, body_text);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {} response", label))
    }
}

/// Pick the backend named by `config.target`, or detect it from model / API base.
pub fn backend_from_config(config: &LlmConfig) -> Result<Arc<dyn ModelBackend>> {
    let target = match config.target.as_deref() {
        Some(t) => t.parse::<ModelTarget>()?,
        None => ModelTarget::detect(&config.model, &config.api_base),
    };
    backend_for(target, config)
}

pub fn backend_for(target: ModelTarget, config: &LlmConfig) -> Result<Arc<dyn ModelBackend>> {
    tracing::debug!(target_model = %target, model = %config.model, "model backend selected");
    Ok(match target {
        ModelTarget::OpenAi => Arc::new(OpenAiBackend::new(config)?),
        ModelTarget::Claude => Arc::new(ClaudeBackend::new(config)?),
        ModelTarget::Gemini => Arc::new(GeminiBackend::new(config)?),
    })
}
