//! Shared types for the agent module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use skillbridge_sandbox::RiskDescriptor;

// ─── UTF-8 safe string helpers ──────────────────────────────────────────────

/// Truncate a string at a safe UTF-8 char boundary (from the start).
/// Returns a &str of at most `max_bytes` bytes, never splitting a multi-byte character.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Model targets ──────────────────────────────────────────────────────────

/// Unknown model target identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported model target: {0} (expected openai, claude or gemini)")]
pub struct UnsupportedTargetError(pub String);

/// Model families with distinct tool-declaration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTarget {
    /// OpenAI function calling (GPT-4, DeepSeek, Qwen and other compatible APIs)
    OpenAi,
    /// Anthropic Messages API
    Claude,
    /// Google Gemini `functionDeclarations`
    Gemini,
}

impl ModelTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    /// Tool-count ceiling used when the caller does not set one.
    pub fn default_max_tools(&self) -> usize {
        match self {
            Self::OpenAi => 25,
            Self::Claude | Self::Gemini => 10,
        }
    }

    /// Detect the target from model name or API base.
    pub fn detect(model: &str, api_base: &str) -> Self {
        let model_lower = model.to_lowercase();
        let base_lower = api_base.to_lowercase();

        if model_lower.starts_with("claude")
            || base_lower.contains("anthropic")
            || base_lower.contains("claude")
        {
            Self::Claude
        } else if model_lower.starts_with("gemini") || base_lower.contains("generativelanguage") {
            Self::Gemini
        } else {
            Self::OpenAi
        }
    }
}

impl FromStr for ModelTarget {
    type Err = UnsupportedTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "gpt" => Ok(Self::OpenAi),
            "claude" | "anthropic" => Ok(Self::Claude),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(UnsupportedTargetError(s.to_string())),
        }
    }
}

impl fmt::Display for ModelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── OpenAI-compatible chat types ───────────────────────────────────────────

/// A chat message in OpenAI format. Backends convert from this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant_with_tool_calls(content: Option<&str>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.map(|s| s.to_string()),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    /// Tool result message. `name` is kept because Gemini correlates
    /// function responses by name, not by id.
    pub fn tool_result(tool_call_id: &str, name: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
            name: Some(name.to_string()),
        }
    }
}

/// A tool call from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function call details. `arguments` is the raw JSON text from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One model reply, normalized across backends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }
}

/// Parse tool calls from a Claude native API response.
/// Claude returns content blocks with type "tool_use".
pub fn parse_claude_tool_calls(content_blocks: &[serde_json::Value]) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    for block in content_blocks {
        if block.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
            let id = block
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let name = block
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let input = block
                .get("input")
                .cloned()
                .unwrap_or(serde_json::json!({}));
            let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
            calls.push(ToolCall::new(id, name, arguments));
        }
    }
    calls
}

// ─── Event sinks ────────────────────────────────────────────────────────────

/// Event sink trait for different output targets (CLI, RPC, SDK).
pub trait EventSink: Send {
    /// Called at the start of each conversation turn (before any other events).
    fn on_turn_start(&mut self) {}
    /// Called when the assistant produces text content.
    fn on_text(&mut self, text: &str);
    /// Called when a tool is about to be invoked.
    fn on_tool_call(&mut self, name: &str, arguments: &str);
    /// Called when a tool returns a result.
    fn on_tool_result(&mut self, name: &str, result: &str, is_error: bool);
    /// Called when a call is paused for approval. The decision itself
    /// arrives on the approval channel, correlated by `call_id`.
    fn on_approval_request(&mut self, _call_id: &str, _skill: &str, _risk: &RiskDescriptor) {}
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct SilentEventSink;

impl EventSink for SilentEventSink {
    fn on_text(&mut self, _text: &str) {}
    fn on_tool_call(&mut self, _name: &str, _arguments: &str) {}
    fn on_tool_result(&mut self, _name: &str, _result: &str, _is_error: bool) {}
}

/// `text` cut to `max` bytes with an ellipsis when longer.
fn ellipsize(text: &str, max: usize) -> String {
    if text.len() > max {
        format!("{}…", safe_truncate(text, max))
    } else {
        text.to_string()
    }
}

/// Terminal event sink for CLI chat. Answers go to stdout, progress to stderr.
pub struct TerminalEventSink {
    pub verbose: bool,
    /// Tools header already printed for the current model round.
    header_shown: bool,
}

impl TerminalEventSink {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            header_shown: false,
        }
    }
}

impl EventSink for TerminalEventSink {
    fn on_turn_start(&mut self) {
        self.header_shown = false;
    }

    fn on_text(&mut self, text: &str) {
        if !text.trim().is_empty() {
            println!("{}", text);
        }
    }

    fn on_tool_call(&mut self, name: &str, arguments: &str) {
        if !self.header_shown {
            self.header_shown = true;
            eprintln!("─── tools ─────────────────────────────");
        }
        if self.verbose {
            eprintln!("🔧 {} {}", name, ellipsize(arguments, 200));
        } else {
            eprintln!("🔧 {}", name);
        }
    }

    fn on_tool_result(&mut self, name: &str, result: &str, is_error: bool) {
        let icon = if is_error { "❌" } else { "✅" };
        let brief = if self.verbose {
            ellipsize(result, 400)
        } else {
            ellipsize(result.lines().next().unwrap_or("(ok)"), 80)
        };
        eprintln!("  {} {}: {}", icon, name, brief);
    }

    fn on_approval_request(&mut self, call_id: &str, skill: &str, risk: &RiskDescriptor) {
        eprintln!("⚠️  {} ({}) needs approval: {}", skill, call_id, risk.reason);
        if self.verbose {
            eprintln!("   arguments: {}", risk.arguments);
        }
    }
}
