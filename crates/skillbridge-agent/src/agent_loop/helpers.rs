//! Tool-result payloads and the fallback final answer.

use serde_json::{json, Value};

use skillbridge_sandbox::{ExecutionResult, ExecutionState, ToolCallRequest};

use crate::types::safe_truncate;

/// Longest stdout / stderr fed back to the model per call.
pub(super) const MAX_RESULT_CHARS: usize = 12_000;

const GUIDANCE_FAILED: &str = "The skill reported a failure. Read stderr, adjust the arguments and retry.";
const GUIDANCE_ERROR: &str = "Execution error or timeout. Narrow the scope of the request before retrying.";
const GUIDANCE_VIOLATION: &str = "A path argument escapes the sandbox. Do not retry this call with the same arguments.";

pub(super) const DENIED_MESSAGE: &str = "The user denied approval for this call. It was not run.";

fn clip(text: &str) -> String {
    if text.len() <= MAX_RESULT_CHARS {
        return text.to_string();
    }
    format!(
        "{}...\n[truncated: {} bytes → {}]",
        safe_truncate(text, MAX_RESULT_CHARS),
        text.len(),
        MAX_RESULT_CHARS
    )
}

/// JSON tool-result content for one resolved call.
pub(super) fn tool_result_payload(result: &ExecutionResult) -> Value {
    let mut payload = json!({
        "call_id": result.call_id,
        "state": result.state.as_str(),
    });
    match result.state {
        ExecutionState::Success => {
            payload["stdout"] = json!(clip(&result.stdout));
        }
        ExecutionState::RequiresApproval => {
            payload["risk_descriptor"] = json!(result.risk_descriptor);
        }
        state => {
            if !result.stdout.is_empty() {
                payload["stdout"] = json!(clip(&result.stdout));
            }
            payload["stderr"] = json!(clip(&result.stderr));
            payload["guidance"] = json!(match state {
                ExecutionState::SecurityViolation => GUIDANCE_VIOLATION,
                ExecutionState::Error => GUIDANCE_ERROR,
                _ => GUIDANCE_FAILED,
            });
        }
    }
    payload
}

/// `failed`-shaped result for a call the user did not approve.
pub(super) fn denied_result(request: &ToolCallRequest, message: &str) -> ExecutionResult {
    ExecutionResult::with_stderr(request, ExecutionState::Failed, message)
}

/// Final answer when the model gives none or the loop is cut short.
pub(super) fn summarize<'a, I>(results: I, reason: Option<&str>) -> String
where
    I: IntoIterator<Item = &'a ExecutionResult>,
{
    let results: Vec<&ExecutionResult> = results.into_iter().collect();
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let mut out = match reason {
        Some(reason) => format!("{}. ", reason),
        None => String::new(),
    };
    out.push_str(&format!(
        "Completed {} tool call(s): {} succeeded, {} did not.",
        results.len(),
        succeeded,
        results.len() - succeeded
    ));
    for r in &results {
        let detail = if r.is_success() {
            r.stdout.lines().next().unwrap_or("")
        } else {
            r.stderr.lines().next().unwrap_or("")
        };
        out.push_str(&format!(
            "\n- {} ({}): {}",
            r.skill_name,
            r.state,
            safe_truncate(detail, 200)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(state: ExecutionState, stdout: &str, stderr: &str) -> ExecutionResult {
        let req = ToolCallRequest::new("call_1", "sample-converter", json!({}));
        ExecutionResult {
            stdout: stdout.to_string(),
            ..ExecutionResult::with_stderr(&req, state, stderr)
        }
    }

    #[test]
    fn test_payload_success_has_stdout_only() {
        let p = tool_result_payload(&result(ExecutionState::Success, "HELLO", ""));
        assert_eq!(p["state"], "success");
        assert_eq!(p["stdout"], "HELLO");
        assert_eq!(p["call_id"], "call_1");
        assert!(p.get("stderr").is_none());
        assert!(p.get("guidance").is_none());
    }

    #[test]
    fn test_payload_guidance_per_state() {
        let failed = tool_result_payload(&result(ExecutionState::Failed, "", "bad operation"));
        assert_eq!(failed["stderr"], "bad operation");
        assert_eq!(failed["guidance"], GUIDANCE_FAILED);

        let error = tool_result_payload(&result(ExecutionState::Error, "", "Execution Timeout (5s)"));
        assert_eq!(error["guidance"], GUIDANCE_ERROR);

        let violation = tool_result_payload(&result(ExecutionState::SecurityViolation, "", "escapes"));
        assert_eq!(violation["guidance"], GUIDANCE_VIOLATION);
    }

    #[test]
    fn test_payload_clips_long_output() {
        let long = "x".repeat(MAX_RESULT_CHARS + 10);
        let p = tool_result_payload(&result(ExecutionState::Success, &long, ""));
        assert!(p["stdout"].as_str().unwrap().contains("[truncated:"));
    }

    #[test]
    fn test_summarize() {
        let ok = result(ExecutionState::Success, "HELLO\nmore", "");
        let bad = result(ExecutionState::Failed, "", "unsupported");
        let text = summarize([&ok, &bad], Some("Stopped after 3 iterations"));
        assert!(text.starts_with("Stopped after 3 iterations. Completed 2 tool call(s): 1 succeeded, 1 did not."));
        assert!(text.contains("- sample-converter (success): HELLO"));
        assert!(text.contains("- sample-converter (failed): unsupported"));
    }
}
