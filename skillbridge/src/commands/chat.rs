//! One agentic turn from the terminal, with approvals read from stdin.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use skillbridge_agent::approval::ApprovalSender;
use skillbridge_agent::{
    approval_channel, backend_from_config, AgentLoop, ApprovalSignal, EventSink, StopReason,
    TerminalEventSink,
};
use skillbridge_core::config::{LlmConfig, LoopConfig, PathsConfig};
use skillbridge_sandbox::{ExecutionEngine, RiskDescriptor};

#[derive(Debug, Default)]
pub struct ChatOptions {
    pub target: Option<String>,
    pub model: Option<String>,
    pub max_iterations: Option<usize>,
    pub system_prompt: Option<String>,
    /// Approve every high-risk call without asking.
    pub yes: bool,
    pub verbose: bool,
}

/// Terminal output plus an approval prompt on stdin.
struct ApprovingSink {
    inner: TerminalEventSink,
    approvals: ApprovalSender,
    auto_approve: bool,
}

impl EventSink for ApprovingSink {
    fn on_turn_start(&mut self) {
        self.inner.on_turn_start();
    }

    fn on_text(&mut self, text: &str) {
        self.inner.on_text(text);
    }

    fn on_tool_call(&mut self, name: &str, arguments: &str) {
        self.inner.on_tool_call(name, arguments);
    }

    fn on_tool_result(&mut self, name: &str, result: &str, is_error: bool) {
        self.inner.on_tool_result(name, result, is_error);
    }

    fn on_approval_request(&mut self, call_id: &str, skill: &str, risk: &RiskDescriptor) {
        self.inner.on_approval_request(call_id, skill, risk);
        if self.auto_approve {
            if let Err(e) = self.approvals.try_send(ApprovalSignal::approve(call_id)) {
                tracing::warn!(call_id, error = %e, "auto-approval not delivered");
            }
            return;
        }

        // The loop keeps waiting on the channel, so stdin is read off the runtime.
        let tx = self.approvals.clone();
        let call_id = call_id.to_string();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut lock = stdin.lock();
            eprint!("   approve {}? [y/N] ", call_id);
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            let signal = match lock.read_line(&mut line) {
                Ok(_) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes") => {
                    ApprovalSignal::approve(call_id)
                }
                _ => ApprovalSignal::deny(call_id),
            };
            let _ = tx.blocking_send(signal);
        });
    }
}

pub fn run(paths: &PathsConfig, message: &str, opts: ChatOptions) -> Result<()> {
    let mut llm = LlmConfig::from_env();
    if let Some(target) = opts.target {
        llm.target = Some(target.to_lowercase());
    }
    if let Some(model) = opts.model {
        llm.model = model;
    }
    if llm.api_key.trim().is_empty() {
        bail!("No API key configured. Set SKILLBRIDGE_API_KEY (or OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY).");
    }
    let mut loop_config = LoopConfig::from_env();
    if let Some(n) = opts.max_iterations {
        loop_config.max_iterations = n;
    }

    let registry = super::load_registry(paths)?;
    let backend = backend_from_config(&llm)?;
    let engine = Arc::new(ExecutionEngine::new(registry, &paths.sandbox_root));
    let mut agent = AgentLoop::new(backend, engine, loop_config);
    if let Some(prompt) = opts.system_prompt {
        agent = agent.with_system_prompt(prompt);
    }

    let (tx, mut rx) = approval_channel(8);
    let mut sink = ApprovingSink {
        inner: TerminalEventSink::new(opts.verbose),
        approvals: tx,
        auto_approve: opts.yes,
    };

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let outcome = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        agent.run(message, Vec::new(), &mut rx, cancel, &mut sink).await
    })?;

    match outcome.stop {
        StopReason::Answered => {}
        StopReason::IterationCap => eprintln!("(stopped at the iteration limit)"),
        StopReason::Cancelled => eprintln!("(cancelled)"),
    }
    tracing::debug!(
        iterations = outcome.conversation.iterations,
        calls = outcome.conversation.records.len(),
        "chat finished"
    );
    Ok(())
}
