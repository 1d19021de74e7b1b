//! Single-call execution outside the agent loop.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;

use skillbridge_core::config::PathsConfig;
use skillbridge_sandbox::runner::ResourceLimits;
use skillbridge_sandbox::{ExecutionContext, ExecutionEngine, SessionGuard, ToolCallRequest};

/// Read the arguments JSON, from stdin when `raw` is "-".
pub fn read_args(raw: &str) -> Result<Value> {
    let text = if raw == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        raw.to_string()
    };
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&text).context("ARGS_JSON is not valid JSON")
}

/// Run one call and return the serialized `ExecutionResult`. The exit
/// status reflects only whether the command itself worked.
pub fn run(
    paths: &PathsConfig,
    skill: &str,
    arguments: Value,
    approve: bool,
    limits: ResourceLimits,
) -> Result<String> {
    let registry = super::load_registry(paths)?;
    let engine = ExecutionEngine::new(registry, &paths.sandbox_root).with_limits(limits);
    let session = SessionGuard::new(Arc::clone(engine.sessions()));

    let call_id = format!("call_{}", uuid::Uuid::new_v4().simple());
    let request = ToolCallRequest::new(call_id, skill, arguments);
    let mut ctx = ExecutionContext::in_session(session.id());
    if approve {
        ctx = ctx.approved();
    }
    let result = engine.run(&request, &ctx);
    Ok(serde_json::to_string_pretty(&result)?)
}
