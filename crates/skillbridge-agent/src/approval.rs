//! Out-of-band approval decisions for paused tool calls.
//!
//! A call that hits the high-risk policy is suspended; the decision reaches
//! the loop through this channel and is matched by `call_id`.

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

impl ApprovalDecision {
    pub fn is_approve(&self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// One external decision, correlated by `call_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalSignal {
    pub call_id: String,
    pub decision: ApprovalDecision,
}

impl ApprovalSignal {
    pub fn approve(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            decision: ApprovalDecision::Approve,
        }
    }

    pub fn deny(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            decision: ApprovalDecision::Deny,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("no pending approval for call {0}")]
    UnknownCall(String),

    #[error("turn is not awaiting approval")]
    NotAwaiting,

    #[error("approval for call {0} expired and was denied")]
    Expired(String),
}

pub type ApprovalSender = mpsc::Sender<ApprovalSignal>;
pub type ApprovalReceiver = mpsc::Receiver<ApprovalSignal>;

/// Bounded channel feeding decisions into [`crate::AgentLoop::run`].
pub fn approval_channel(capacity: usize) -> (ApprovalSender, ApprovalReceiver) {
    mpsc::channel(capacity.max(1))
}
