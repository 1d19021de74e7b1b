//! Core agent loop: model ↔ tool execution cycle as an explicit state machine.
//!
//! A [`Turn`] moves through [`LoopState`]:
//!
//! ```text
//! AwaitingModel ──tool calls──▶ ExecutingTools ──all resolved──▶ AwaitingModel
//!       │                          │      ▲
//!       │ final answer             │      │ approve / deny (by call_id)
//!       ▼                          ▼      │
//!      Done ◀──cap / cancel──  AwaitingApproval
//! ```
//!
//! [`AgentLoop::advance`] drives a turn until it needs an approval decision
//! or is done; [`AgentLoop::resume`] applies one decision; [`AgentLoop::run`]
//! does both against an approval channel with expiry and cancellation.
//!
//! Sub-modules:
//!   - `execution`: per-call dispatch on the blocking pool, error retries
//!   - `helpers`: tool-result payloads and the fallback summary

mod execution;
mod helpers;


use anyhow::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use skillbridge_core::config::LoopConfig;
use skillbridge_core::{observability, selector, SkillDescriptor};
use skillbridge_sandbox::{ExecutionEngine, ExecutionResult, ExecutionState, SessionGuard};

use crate::approval::{ApprovalError, ApprovalReceiver, ApprovalSignal};
use crate::builtin;
use crate::llm::ModelBackend;
use crate::prompt;
use crate::schema::SchemaCache;
use crate::types::{ChatMessage, EventSink, ToolCall};

use execution::{execute_call, refused_repeat, RoundSlot, SlotPhase};
use helpers::{denied_result, summarize, tool_result_payload, DENIED_MESSAGE};

/// Per-turn state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools,
    AwaitingApproval,
    Done,
}

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model returned a final answer.
    Answered,
    /// `max_iterations` model rounds were used.
    IterationCap,
    Cancelled,
}

/// One (model message, tool call, tool result) triple.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub model_message: Option<String>,
    pub call: ToolCall,
    pub result: ExecutionResult,
}

/// Everything a finished turn produced.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub records: Vec<TurnRecord>,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_answer: String,
    pub stop: StopReason,
    pub conversation: ConversationTurn,
    /// Message history including this turn, for the next turn's context.
    pub messages: Vec<ChatMessage>,
}

/// A call paused for approval, as seen by the caller.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub call_id: String,
    pub skill_name: String,
    pub reason: String,
    pub arguments: Value,
}

/// One conversation turn in flight. Owns its execution session; the session
/// and its temp artifacts are released when the turn finishes or is dropped.
pub struct Turn {
    state: LoopState,
    messages: Vec<ChatMessage>,
    tools: Vec<Value>,
    offered: Vec<String>,
    iterations: usize,
    round: Vec<RoundSlot>,
    /// Assistant text that accompanied the current round's calls.
    round_text: Option<String>,
    records: Vec<TurnRecord>,
    violations: HashSet<String>,
    session: Option<SessionGuard>,
    session_id: String,
    cancel: CancellationToken,
    final_answer: Option<String>,
    stop: Option<StopReason>,
}

impl Turn {
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Names of the tools offered to the model this turn.
    pub fn offered_tools(&self) -> &[String] {
        &self.offered
    }

    pub fn records(&self) -> &[TurnRecord] {
        &self.records
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Calls currently waiting for a decision, in call order.
    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.round
            .iter()
            .filter_map(|slot| match &slot.phase {
                SlotPhase::AwaitingApproval { risk, .. } => Some(PendingApproval {
                    call_id: slot.call.id.clone(),
                    skill_name: slot.request.skill_name.clone(),
                    reason: risk.reason.clone(),
                    arguments: risk.arguments.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    /// Consume the turn. The session is released here at the latest.
    pub fn finish(mut self) -> TurnOutcome {
        self.session.take();
        let stop = self.stop.unwrap_or(StopReason::Cancelled);
        TurnOutcome {
            final_answer: self.final_answer.take().unwrap_or_default(),
            stop,
            conversation: ConversationTurn {
                records: std::mem::take(&mut self.records),
                iterations: self.iterations,
            },
            messages: std::mem::take(&mut self.messages),
        }
    }

    fn conclude(&mut self, answer: String, stop: StopReason, sink: &mut dyn EventSink) {
        sink.on_text(&answer);
        self.final_answer = Some(answer);
        self.stop = Some(stop);
        self.state = LoopState::Done;
        // Ends the session and removes its temp artifacts.
        self.session.take();
    }

    fn has_awaiting(&self) -> bool {
        self.round.iter().any(RoundSlot::is_awaiting)
    }
}

/// Model-agnostic agentic loop over one backend and one execution engine.
pub struct AgentLoop {
    backend: Arc<dyn ModelBackend>,
    engine: Arc<ExecutionEngine>,
    schemas: Arc<SchemaCache>,
    config: LoopConfig,
    max_tools: usize,
    system_prompt: Option<String>,
}

impl AgentLoop {
    pub fn new(backend: Arc<dyn ModelBackend>, engine: Arc<ExecutionEngine>, config: LoopConfig) -> Self {
        let max_tools = backend.target().default_max_tools();
        Self {
            backend,
            engine,
            schemas: Arc::new(SchemaCache::new()),
            config,
            max_tools,
            system_prompt: None,
        }
    }

    pub fn with_max_tools(mut self, max_tools: usize) -> Self {
        self.max_tools = max_tools;
        self
    }

    /// Share rendered schemas with other loops.
    pub fn with_schema_cache(mut self, schemas: Arc<SchemaCache>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn schemas(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    /// Select tools for `user_message`, render them and open a session.
    pub fn start_turn(&self, user_message: &str, history: Vec<ChatMessage>, cancel: CancellationToken) -> Turn {
        let catalog = self.engine.registry().snapshot();
        self.schemas.sync_catalog(&catalog);
        let selected: Vec<Arc<SkillDescriptor>> =
            selector::select(user_message, catalog.skills(), self.max_tools);

        let mut tools: Vec<Value> = selected
            .iter()
            .map(|s| self.schemas.render(s, self.backend.target()))
            .collect();
        let mut offered: Vec<String> = selected.iter().map(|s| s.name.clone()).collect();
        if selected.iter().any(|s| s.has_references) {
            tools.extend(builtin::declarations(self.backend.target()));
            offered.extend([builtin::READ_RESOURCE.to_string(), builtin::SEARCH_RESOURCE.to_string()]);
        }

        let system = prompt::build_system_prompt(self.system_prompt.as_deref(), &selected);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(&system));
        messages.extend(history.into_iter().filter(|m| m.role != "system"));
        messages.push(ChatMessage::user(user_message));

        let session = SessionGuard::new(Arc::clone(self.engine.sessions()));
        let session_id = session.id().to_string();
        tracing::info!(
            session_id = %session_id,
            tools = offered.len(),
            generation = catalog.generation(),
            "turn started"
        );

        Turn {
            state: LoopState::AwaitingModel,
            messages,
            tools,
            offered,
            iterations: 0,
            round: Vec::new(),
            round_text: None,
            records: Vec::new(),
            violations: HashSet::new(),
            session: Some(session),
            session_id,
            cancel,
            final_answer: None,
            stop: None,
        }
    }

    /// Drive `turn` until it is `AwaitingApproval` or `Done`.
    pub async fn advance(&self, turn: &mut Turn, sink: &mut dyn EventSink) -> Result<()> {
        loop {
            if turn.state != LoopState::Done && turn.cancel.is_cancelled() {
                self.cancel_turn(turn, sink);
            }
            match turn.state {
                LoopState::Done | LoopState::AwaitingApproval => return Ok(()),
                LoopState::AwaitingModel => self.step_model(turn, sink).await?,
                LoopState::ExecutingTools => self.step_tools(turn, sink).await,
            }
        }
    }

    async fn step_model(&self, turn: &mut Turn, sink: &mut dyn EventSink) -> Result<()> {
        if turn.iterations >= self.config.max_iterations {
            tracing::warn!("Agent loop reached max iterations ({})", self.config.max_iterations);
            let reason = format!("Stopped after {} iterations", self.config.max_iterations);
            let answer = summarize(turn.records.iter().map(|r| &r.result), Some(&reason));
            turn.conclude(answer, StopReason::IterationCap, sink);
            return Ok(());
        }
        turn.iterations += 1;
        sink.on_turn_start();

        let cancel = turn.cancel.clone();
        let invoked = tokio::select! {
            r = self.backend.invoke(&turn.messages, &turn.tools) => Some(r),
            _ = cancel.cancelled() => None,
        };
        let Some(response) = invoked else {
            self.cancel_turn(turn, sink);
            return Ok(());
        };
        let response = response?;
        let text = response.content.filter(|c| !c.trim().is_empty());

        if response.tool_calls.is_empty() {
            turn.messages.push(ChatMessage::assistant(text.as_deref().unwrap_or("")));
            let answer = match text {
                Some(t) => t,
                None => summarize(turn.records.iter().map(|r| &r.result), None),
            };
            turn.conclude(answer, StopReason::Answered, sink);
            return Ok(());
        }

        let mut calls = response.tool_calls;
        for call in calls.iter_mut() {
            // Results and approvals are correlated by id.
            if call.id.is_empty() {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
        }
        turn.messages
            .push(ChatMessage::assistant_with_tool_calls(text.as_deref(), calls.clone()));
        turn.round = calls.into_iter().map(RoundSlot::new).collect();
        turn.round_text = text;
        turn.state = LoopState::ExecutingTools;
        Ok(())
    }

    async fn step_tools(&self, turn: &mut Turn, sink: &mut dyn EventSink) {
        for idx in 0..turn.round.len() {
            if turn.cancel.is_cancelled() {
                self.cancel_turn(turn, sink);
                return;
            }
            let approved = match turn.round[idx].phase {
                SlotPhase::Queued => false,
                SlotPhase::Approved => true,
                _ => continue,
            };
            let slot = &turn.round[idx];
            let key = slot.violation_key();
            sink.on_tool_call(&slot.call.function.name, &slot.call.function.arguments);

            let result = if !approved && turn.violations.contains(&key) {
                tracing::warn!(call_id = %slot.call.id, skill = %slot.request.skill_name, "repeated violating call refused");
                refused_repeat(&slot.request)
            } else {
                execute_call(
                    &self.engine,
                    slot,
                    &turn.session_id,
                    approved,
                    &turn.cancel,
                    self.config.max_error_retries,
                )
                .await
            };

            match (result.state, result.risk_descriptor.clone()) {
                (ExecutionState::RequiresApproval, Some(risk)) => {
                    sink.on_approval_request(&result.call_id, &result.skill_name, &risk);
                    turn.round[idx].phase = SlotPhase::AwaitingApproval {
                        risk,
                        since: Instant::now(),
                    };
                }
                _ => {
                    if result.state == ExecutionState::SecurityViolation {
                        turn.violations.insert(key);
                    }
                    let brief = if result.is_success() { &result.stdout } else { &result.stderr };
                    sink.on_tool_result(&result.skill_name, brief, !result.is_success());
                    turn.round[idx].phase = SlotPhase::Resolved(result);
                }
            }
        }

        if turn.has_awaiting() {
            turn.state = LoopState::AwaitingApproval;
            return;
        }
        self.flush_round(turn);
        turn.state = LoopState::AwaitingModel;
    }

    /// Feed the resolved round back as tool messages, in call order.
    fn flush_round(&self, turn: &mut Turn) {
        let model_message = turn.round_text.take();
        for slot in std::mem::take(&mut turn.round) {
            let SlotPhase::Resolved(result) = slot.phase else {
                continue;
            };
            let payload = tool_result_payload(&result);
            turn.messages.push(ChatMessage::tool_result(
                &slot.call.id,
                &slot.call.function.name,
                &payload.to_string(),
            ));
            turn.records.push(TurnRecord {
                model_message: model_message.clone(),
                call: slot.call,
                result,
            });
        }
    }

    /// Apply one approval decision. An approval moves the turn back to
    /// `ExecutingTools` once no other call of the round is undecided.
    pub fn resume(&self, turn: &mut Turn, signal: ApprovalSignal) -> Result<(), ApprovalError> {
        if turn.state != LoopState::AwaitingApproval {
            return Err(ApprovalError::NotAwaiting);
        }
        let timeout = self.approval_timeout();
        let Some(slot) = turn
            .round
            .iter_mut()
            .find(|s| s.is_awaiting() && s.call.id == signal.call_id)
        else {
            return Err(ApprovalError::UnknownCall(signal.call_id));
        };
        let SlotPhase::AwaitingApproval { since, .. } = slot.phase else {
            return Err(ApprovalError::UnknownCall(signal.call_id));
        };

        let outcome = if timeout.is_some_and(|t| since.elapsed() >= t) {
            observability::audit_approval_decision(&slot.call.id, false, "expired");
            slot.phase = SlotPhase::Resolved(denied_result(&slot.request, &expired_message(timeout)));
            Err(ApprovalError::Expired(signal.call_id))
        } else if signal.decision.is_approve() {
            observability::audit_approval_decision(&slot.call.id, true, "user");
            tracing::info!(call_id = %slot.call.id, skill = %slot.request.skill_name, "call approved");
            slot.phase = SlotPhase::Approved;
            Ok(())
        } else {
            observability::audit_approval_decision(&slot.call.id, false, "user");
            tracing::info!(call_id = %slot.call.id, skill = %slot.request.skill_name, "call denied");
            slot.phase = SlotPhase::Resolved(denied_result(&slot.request, DENIED_MESSAGE));
            Ok(())
        };

        if !turn.has_awaiting() {
            turn.state = LoopState::ExecutingTools;
        }
        outcome
    }

    /// Deny every pending approval older than the expiry. Returns how many expired.
    pub fn expire_overdue(&self, turn: &mut Turn) -> usize {
        let Some(timeout) = self.approval_timeout() else {
            return 0;
        };
        let message = expired_message(Some(timeout));
        let mut expired = 0;
        for slot in turn.round.iter_mut() {
            if let SlotPhase::AwaitingApproval { since, .. } = slot.phase {
                if since.elapsed() >= timeout {
                    observability::audit_approval_decision(&slot.call.id, false, "expired");
                    tracing::warn!(call_id = %slot.call.id, "approval expired, treating as denied");
                    slot.phase = SlotPhase::Resolved(denied_result(&slot.request, &message));
                    expired += 1;
                }
            }
        }
        if turn.state == LoopState::AwaitingApproval && !turn.has_awaiting() {
            turn.state = LoopState::ExecutingTools;
        }
        expired
    }

    /// Deny every pending approval, e.g. when no decision can arrive anymore.
    fn deny_pending(&self, turn: &mut Turn, source: &str) {
        for slot in turn.round.iter_mut().filter(|s| s.is_awaiting()) {
            observability::audit_approval_decision(&slot.call.id, false, source);
            slot.phase = SlotPhase::Resolved(denied_result(&slot.request, DENIED_MESSAGE));
        }
        if turn.state == LoopState::AwaitingApproval {
            turn.state = LoopState::ExecutingTools;
        }
    }

    /// Terminate the turn from any state.
    pub fn cancel_turn(&self, turn: &mut Turn, sink: &mut dyn EventSink) {
        if turn.state == LoopState::Done {
            return;
        }
        turn.cancel.cancel();
        let model_message = turn.round_text.take();
        for slot in std::mem::take(&mut turn.round) {
            match slot.phase {
                SlotPhase::AwaitingApproval { .. } | SlotPhase::Approved => {
                    observability::audit_approval_decision(&slot.call.id, false, "cancelled");
                }
                SlotPhase::Resolved(result) => turn.records.push(TurnRecord {
                    model_message: model_message.clone(),
                    call: slot.call,
                    result,
                }),
                SlotPhase::Queued => {}
            }
        }
        tracing::info!(session_id = %turn.session_id, iterations = turn.iterations, "turn cancelled");
        turn.conclude("Cancelled.".to_string(), StopReason::Cancelled, sink);
    }

    /// Time until the oldest pending approval expires.
    fn next_expiry(&self, turn: &Turn) -> Option<Duration> {
        let timeout = self.approval_timeout()?;
        turn.round
            .iter()
            .filter_map(|s| match s.phase {
                SlotPhase::AwaitingApproval { since, .. } => Some(timeout.saturating_sub(since.elapsed())),
                _ => None,
            })
            .min()
    }

    fn approval_timeout(&self) -> Option<Duration> {
        (self.config.approval_timeout_secs > 0)
            .then(|| Duration::from_secs(self.config.approval_timeout_secs))
    }

    /// Run one turn end to end. Approval decisions arrive on `approvals`;
    /// `cancel` terminates the turn from any state.
    pub async fn run(
        &self,
        user_message: &str,
        history: Vec<ChatMessage>,
        approvals: &mut ApprovalReceiver,
        cancel: CancellationToken,
        sink: &mut dyn EventSink,
    ) -> Result<TurnOutcome> {
        let mut turn = self.start_turn(user_message, history, cancel);
        loop {
            self.advance(&mut turn, sink).await?;
            if turn.state == LoopState::Done {
                break;
            }

            let wait = self.next_expiry(&turn);
            let cancel = turn.cancel.clone();
            let event = tokio::select! {
                _ = cancel.cancelled() => WaitEvent::Cancelled,
                signal = approvals.recv() => match signal {
                    Some(s) => WaitEvent::Signal(s),
                    None => WaitEvent::Closed,
                },
                _ = sleep_or_forever(wait) => WaitEvent::Expired,
            };
            match event {
                WaitEvent::Cancelled => self.cancel_turn(&mut turn, sink),
                WaitEvent::Signal(signal) => {
                    if let Err(e) = self.resume(&mut turn, signal) {
                        tracing::warn!(error = %e, "approval signal not applied");
                    }
                }
                WaitEvent::Closed => self.deny_pending(&mut turn, "channel_closed"),
                WaitEvent::Expired => {
                    self.expire_overdue(&mut turn);
                }
            }
        }
        tracing::info!(
            session_id = %turn.session_id,
            iterations = turn.iterations,
            calls = turn.records.len(),
            "turn finished"
        );
        Ok(turn.finish())
    }
}

enum WaitEvent {
    Cancelled,
    Signal(ApprovalSignal),
    Closed,
    Expired,
}

async fn sleep_or_forever(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

fn expired_message(timeout: Option<Duration>) -> String {
    match timeout {
        Some(t) => format!("Approval expired after {}s and was treated as denied. The call was not run.", t.as_secs()),
        None => "Approval expired and was treated as denied. The call was not run.".to_string(),
    }
}
