//! SandboxBackend trait: extension point for isolation strategies.
//!
//! The engine hands a fully prepared [`LaunchSpec`] to the backend; path
//! containment and approval gating have already happened by then. The default
//! backend runs each call as a plain child process in its own process group.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::common::ProcessOutput;
use crate::runner::{spawn_supervised, LaunchSpec, ResourceLimits};

pub trait SandboxBackend: Send + Sync {
    /// Backend name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Run one call to completion (or until killed by limits or `cancel`).
    fn execute(
        &self,
        spec: &LaunchSpec,
        limits: ResourceLimits,
        cancel: Option<&CancellationToken>,
    ) -> Result<ProcessOutput>;
}

/// One process (group) per call, environment cleared, cwd at the sandbox root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBackend;

impl SandboxBackend for ProcessBackend {
    fn name(&self) -> &str {
        "process-group"
    }

    fn execute(
        &self,
        spec: &LaunchSpec,
        limits: ResourceLimits,
        cancel: Option<&CancellationToken>,
    ) -> Result<ProcessOutput> {
        spawn_supervised(spec, limits, cancel)
    }
}
