use anyhow::{Context, Result};
use skillbridge_core::config::ExecutionConfig;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tokio_util::sync::CancellationToken;

use crate::common::{wait_with_timeout, ProcessOutput, DEFAULT_MAX_MEMORY_MB, DEFAULT_TIMEOUT_SECS};
use crate::runtime_resolver::ResolvedRuntime;

/// Variables copied from the parent; everything else is cleared.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "SYSTEMROOT", "TMPDIR"];

/// Resource limits for skill execution
///
/// Default values are defined in `common.rs`:
/// - `max_memory_mb`: DEFAULT_MAX_MEMORY_MB (256 MB)
/// - `timeout_secs`: DEFAULT_TIMEOUT_SECS (30 seconds)
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub max_memory_mb: u64,
    pub timeout_secs: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ResourceLimits {
    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }

    /// Load resource limits from SKILLBRIDGE_TIMEOUT_SECS / SKILLBRIDGE_MAX_MEMORY_MB
    pub fn from_env() -> Self {
        let cfg = ExecutionConfig::from_env();
        Self {
            max_memory_mb: cfg.max_memory_mb,
            timeout_secs: cfg.timeout_secs,
        }
    }

    /// Override with CLI parameters
    pub fn with_cli_overrides(mut self, cli_max_memory: Option<u64>, cli_timeout: Option<u64>) -> Self {
        if let Some(max_memory) = cli_max_memory {
            self.max_memory_mb = max_memory;
        }
        if let Some(timeout) = cli_timeout {
            self.timeout_secs = timeout;
        }
        self
    }
}

/// Everything needed to start one skill process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Skill name (logging only)
    pub name: String,
    pub skill_dir: PathBuf,
    /// Entry point script path relative to `skill_dir`
    pub entry_point: String,
    pub runtime: ResolvedRuntime,
    /// Working directory; the sandbox root.
    pub work_dir: PathBuf,
    /// Variables added after the environment is cleared.
    pub env: Vec<(String, String)>,
    /// Written to the child's stdin.
    pub input_json: String,
}

impl LaunchSpec {
    /// Display form of the command line, for audit records.
    pub fn command_line(&self) -> String {
        format!(
            "{} {}",
            self.runtime.interpreter.display(),
            self.skill_dir.join(&self.entry_point).display()
        )
    }
}

/// Spawn the child in its own process group and supervise it to completion.
pub fn spawn_supervised(
    spec: &LaunchSpec,
    limits: ResourceLimits,
    cancel: Option<&CancellationToken>,
) -> Result<ProcessOutput> {
    let mut cmd = Command::new(&spec.runtime.interpreter);
    cmd.arg(spec.skill_dir.join(&spec.entry_point));
    cmd.current_dir(&spec.work_dir);

    cmd.env_clear();
    for key in PASSTHROUGH_ENV {
        if let Ok(v) = std::env::var(key) {
            cmd.env(key, v);
        }
    }
    cmd.envs(spec.runtime.extra_env.iter().map(|(k, v)| (k, v)));
    cmd.envs(spec.env.iter().map(|(k, v)| (k, v)));

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn skill process: {}", spec.command_line()))?;

    // Written from a thread: a child that never reads stdin must not stall us.
    if let Some(mut stdin) = child.stdin.take() {
        let input = spec.input_json.clone();
        std::thread::spawn(move || {
            let _ = stdin.write_all(input.as_bytes());
        });
    }

    wait_with_timeout(&mut child, limits.timeout_secs, limits.max_memory_bytes(), cancel)
}
