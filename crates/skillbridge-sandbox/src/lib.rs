pub mod common;
pub mod engine;
pub mod log;
pub mod path_guard;
pub mod resources;
pub mod risk;
pub mod runner;
pub mod runtime_resolver;
pub mod sandbox_backend;
pub mod session;

pub use engine::{ExecutionContext, ExecutionEngine, ExecutionResult, ExecutionState, ToolCallRequest};
pub use risk::{HighRiskPolicy, RiskDescriptor};
pub use session::{SessionGuard, SessionStore};
