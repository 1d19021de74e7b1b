//! System prompt for a turn.

use std::sync::Arc;

use skillbridge_core::SkillDescriptor;

use crate::types::safe_truncate;

/// Default system prompt for the agent.
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant with access to sandboxed skills exposed as tools.

CRITICAL RULE: you MUST actually call tools to perform actions. NEVER claim a task is done unless you invoked the corresponding tool in this turn and received a successful result.

Tool results are JSON objects with a `state` field:
- success: `stdout` holds the output. Use it in your answer.
- failed: read `stderr`, adjust the arguments and try again.
- error: the call timed out or the skill is unavailable. Narrow the scope or answer without it.
- security_violation: a path left the sandbox. Do NOT retry the same call.

Pass file paths relative to the workspace. Be concise and accurate."#;

/// Longest skill summary line in the prompt.
const SUMMARY_CHARS: usize = 160;

/// Build the system prompt. `custom` replaces the default instructions; the
/// availability notes for `offered` skills are appended either way.
pub fn build_system_prompt(custom: Option<&str>, offered: &[Arc<SkillDescriptor>]) -> String {
    let mut prompt = custom.unwrap_or(DEFAULT_SYSTEM_PROMPT).trim().to_string();

    let unavailable: Vec<_> = offered.iter().filter(|s| !s.is_ready()).collect();
    if !unavailable.is_empty() {
        prompt.push_str("\n\nThese skills are installed but cannot run until their dependencies are installed. Tell the user what is missing instead of calling them:");
        for skill in unavailable {
            prompt.push_str(&format!(
                "\n- {}: {} (missing: {})",
                skill.name,
                safe_truncate(skill.description.trim(), SUMMARY_CHARS),
                skill.readiness.missing_deps.join(", ")
            ));
        }
    }
    prompt
}
