//! Execution sub-module: one round of tool calls.
//!
//! Engine calls are blocking (child-process supervision), so each runs on the
//! blocking pool with a child cancellation token of the turn.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use skillbridge_sandbox::{
    ExecutionContext, ExecutionEngine, ExecutionResult, ExecutionState, RiskDescriptor,
    ToolCallRequest,
};

use crate::builtin;
use crate::types::ToolCall;

/// Where one call of the current round stands.
#[derive(Debug, Clone)]
pub(super) enum SlotPhase {
    Queued,
    AwaitingApproval { risk: RiskDescriptor, since: Instant },
    /// Approved; runs on the next `advance`.
    Approved,
    Resolved(ExecutionResult),
}

/// One model-issued call and its progress.
#[derive(Debug, Clone)]
pub(super) struct RoundSlot {
    pub call: ToolCall,
    pub request: ToolCallRequest,
    /// Set when the model sent arguments that are not JSON.
    pub parse_error: Option<String>,
    pub phase: SlotPhase,
}

impl RoundSlot {
    pub fn new(call: ToolCall) -> Self {
        let raw = call.function.arguments.trim();
        let (arguments, parse_error) = if raw.is_empty() {
            (json!({}), None)
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(v) => (v, None),
                Err(e) => (Value::Null, Some(format!("arguments are not valid JSON: {}", e))),
            }
        };
        let request = ToolCallRequest::new(call.id.clone(), call.function.name.clone(), arguments);
        Self {
            call,
            request,
            parse_error,
            phase: SlotPhase::Queued,
        }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.phase, SlotPhase::AwaitingApproval { .. })
    }

    /// Identity of (skill, arguments) used to refuse repeated violations.
    pub fn violation_key(&self) -> String {
        format!(
            "{}\u{0}{}",
            self.request.skill_name.to_lowercase(),
            serde_json::to_string(&self.request.arguments).unwrap_or_default()
        )
    }
}

/// Refusal for a call identical to one that already violated the sandbox.
pub(super) fn refused_repeat(request: &ToolCallRequest) -> ExecutionResult {
    ExecutionResult::with_stderr(
        request,
        ExecutionState::SecurityViolation,
        "refused: an identical call already violated the sandbox boundary",
    )
}

/// Run one call, retrying `error` results up to `max_error_retries` times.
pub(super) async fn execute_call(
    engine: &Arc<ExecutionEngine>,
    slot: &RoundSlot,
    session_id: &str,
    approved: bool,
    cancel: &CancellationToken,
    max_error_retries: usize,
) -> ExecutionResult {
    if let Some(ref e) = slot.parse_error {
        return ExecutionResult::with_stderr(&slot.request, ExecutionState::Failed, e.clone());
    }
    if builtin::is_builtin(&slot.request.skill_name) {
        let engine = Arc::clone(engine);
        let request = slot.request.clone();
        return run_blocking(&slot.request, move || {
            builtin::dispatch(engine.registry(), &request)
        })
        .await;
    }

    let mut attempt = 0;
    loop {
        let mut ctx = ExecutionContext::in_session(session_id).with_cancel(cancel.child_token());
        if approved {
            ctx = ctx.approved();
        }
        let engine = Arc::clone(engine);
        let request = slot.request.clone();
        let result = run_blocking(&slot.request, move || engine.run(&request, &ctx)).await;

        if result.state == ExecutionState::Error && attempt < max_error_retries && !cancel.is_cancelled() {
            attempt += 1;
            tracing::info!(
                call_id = %slot.request.call_id,
                skill = %slot.request.skill_name,
                attempt,
                "retrying after execution error"
            );
            continue;
        }
        return result;
    }
}

async fn run_blocking<F>(request: &ToolCallRequest, f: F) -> ExecutionResult
where
    F: FnOnce() -> ExecutionResult + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(call_id = %request.call_id, error = %e, "execution task failed");
            ExecutionResult::with_stderr(request, ExecutionState::Error, format!("execution task failed: {}", e))
        }
    }
}
