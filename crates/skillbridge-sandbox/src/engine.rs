//! Execution engine: one tool call in, one classified [`ExecutionResult`] out.
//!
//! Order of checks for every call:
//! 1. skill lookup in the current registry snapshot
//! 2. sandbox root canonicalization and path containment of every
//!    filesystem argument (no process is started on failure)
//! 3. argument normalization and schema validation
//! 4. readiness (degraded skills are not run)
//! 5. high-risk predicates, unless the call was approved
//! 6. spawn under the backend with timeout, memory and cancellation supervision

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use skillbridge_core::config::ExecutionConfig;
use skillbridge_core::observability;
use skillbridge_core::path_validation::canonical_root;
use skillbridge_core::skill::SkillDescriptor;
use skillbridge_core::Registry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::common::{KillReason, ProcessOutput};
use crate::info_log;
use crate::path_guard::sanitize_arguments;
use crate::risk::{HighRiskPolicy, RiskDescriptor};
use crate::runner::{LaunchSpec, ResourceLimits};
use crate::runtime_resolver::{RuntimePaths, RuntimeResolver};
use crate::sandbox_backend::{ProcessBackend, SandboxBackend};
use crate::session::SessionStore;

/// Outcome class of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Exit code 0, path checks passed.
    Success,
    /// Non-zero exit or rejected arguments; the model may retry differently.
    Failed,
    /// A path escaped the sandbox root. Never retried.
    SecurityViolation,
    /// Timeout, cancellation or infrastructure fault.
    Error,
    /// Paused until an external approval decision arrives.
    RequiresApproval,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::SecurityViolation => "security_violation",
            Self::Error => "error",
            Self::RequiresApproval => "requires_approval",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id from the model; echoed back unchanged.
    pub call_id: String,
    pub skill_name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(call_id: impl Into<String>, skill_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            skill_name: skill_name.into(),
            arguments,
        }
    }
}

/// Immutable result of one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub call_id: String,
    pub skill_name: String,
    pub state: ExecutionState,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_descriptor: Option<RiskDescriptor>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn new(request: &ToolCallRequest, state: ExecutionState) -> Self {
        Self {
            call_id: request.call_id.clone(),
            skill_name: request.skill_name.clone(),
            state,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            risk_descriptor: None,
            duration_ms: 0,
        }
    }

    pub fn with_stderr(request: &ToolCallRequest, state: ExecutionState, message: impl Into<String>) -> Self {
        Self {
            stderr: message.into(),
            ..Self::new(request, state)
        }
    }

    fn requires_approval(request: &ToolCallRequest, risk: RiskDescriptor) -> Self {
        Self {
            risk_descriptor: Some(risk),
            ..Self::new(request, ExecutionState::RequiresApproval)
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == ExecutionState::Success
    }
}

/// Per-call options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Session that owns temp artifacts; `None` uses a one-call session.
    pub session_id: Option<String>,
    /// The call already passed the approval gate.
    pub approved: bool,
    pub cancel: Option<CancellationToken>,
}

impl ExecutionContext {
    pub fn in_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

pub struct ExecutionEngine {
    registry: Arc<Registry>,
    sandbox_root: PathBuf,
    backend: Arc<dyn SandboxBackend>,
    runtimes: Arc<dyn RuntimeResolver>,
    policy: HighRiskPolicy,
    limits: ResourceLimits,
    sessions: Arc<SessionStore>,
}

impl ExecutionEngine {
    /// Engine with the process backend, PATH-detected runtimes and limits,
    /// policy and session TTL from the environment.
    pub fn new(registry: Arc<Registry>, sandbox_root: impl Into<PathBuf>) -> Self {
        let cfg = ExecutionConfig::from_env();
        Self {
            registry,
            sandbox_root: sandbox_root.into(),
            backend: Arc::new(ProcessBackend),
            runtimes: Arc::new(RuntimePaths::detect()),
            policy: HighRiskPolicy::from_env(),
            limits: ResourceLimits::from_env(),
            sessions: Arc::new(SessionStore::new(Duration::from_secs(cfg.session_ttl_secs))),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn SandboxBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_runtimes(mut self, runtimes: Arc<dyn RuntimeResolver>) -> Self {
        self.runtimes = runtimes;
        self
    }

    pub fn with_policy(mut self, policy: HighRiskPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    /// Execute against the configured sandbox root.
    pub fn run(&self, request: &ToolCallRequest, ctx: &ExecutionContext) -> ExecutionResult {
        self.execute(request, &self.sandbox_root, ctx)
    }

    /// Execute one call with `sandbox_root` as the containment boundary.
    ///
    /// Sessions idle past the TTL are ended first, so artifacts of callers
    /// that never end their session are still removed.
    pub fn execute(
        &self,
        request: &ToolCallRequest,
        sandbox_root: &Path,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let start = Instant::now();
        if let Some(ref session_id) = ctx.session_id {
            self.sessions.touch(session_id);
        }
        self.sessions.sweep_expired();
        let mut result = self.execute_inner(request, sandbox_root, ctx);
        if result.duration_ms == 0 {
            result.duration_ms = start.elapsed().as_millis() as u64;
        }
        if let Some(ref session_id) = ctx.session_id {
            self.sessions
                .record_tool_call(session_id, &result.call_id, &result.skill_name, result.state.as_str());
        }
        observability::audit_execution_completed(
            &result.skill_name,
            &result.call_id,
            result.state.as_str(),
            result.exit_code,
            result.duration_ms,
            result.stdout.len(),
        );
        tracing::debug!(
            skill = %result.skill_name,
            call_id = %result.call_id,
            state = %result.state,
            duration_ms = result.duration_ms,
            "tool call classified"
        );
        result
    }

    fn execute_inner(
        &self,
        request: &ToolCallRequest,
        sandbox_root: &Path,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        use ExecutionState::*;

        if ctx.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return ExecutionResult::with_stderr(request, Error, "cancelled");
        }

        let skill = match self.registry.get(&request.skill_name) {
            Ok(s) => s,
            Err(e) => return ExecutionResult::with_stderr(request, Error, e.to_string()),
        };

        let root = match canonical_root(sandbox_root) {
            Ok(r) => r,
            Err(e) => {
                observability::security_path_violation(&skill.name, &request.call_id, "<sandbox_root>", &e.to_string());
                return ExecutionResult::with_stderr(request, SecurityViolation, e.to_string());
            }
        };

        let Some(raw_args) = arguments_object(&request.arguments) else {
            return ExecutionResult::with_stderr(
                request,
                Failed,
                skillbridge_core::ValidationError::NotAnObject.to_string(),
            );
        };

        let validator = self.registry.validator(&skill);
        let mut args = validator.normalize_keys(&raw_args);

        if let Err(v) = sanitize_arguments(&root, &skill.parameters, &mut args) {
            observability::security_path_violation(&skill.name, &request.call_id, &v.argument, &v.error.to_string());
            return ExecutionResult::with_stderr(
                request,
                SecurityViolation,
                format!("Security Violation: argument '{}': {}", v.argument, v.error),
            );
        }

        let args_value = Value::Object(args.clone());
        if let Err(e) = validator.validate(&args_value) {
            return ExecutionResult::with_stderr(request, Failed, e.to_string());
        }

        if !skill.is_ready() {
            return ExecutionResult::with_stderr(
                request,
                Error,
                format!(
                    "skill '{}' unavailable: missing dependencies: {}",
                    skill.name,
                    skill.readiness.missing_deps.join(", ")
                ),
            );
        }

        if !ctx.approved {
            if let Some(risk) = self.policy.assess(&skill, &args) {
                tracing::info!(
                    skill = %skill.name,
                    call_id = %request.call_id,
                    category = %risk.category,
                    "High-risk call paused for approval"
                );
                observability::audit_approval_requested(&skill.name, &request.call_id, &risk.reason);
                return ExecutionResult::requires_approval(request, risk);
            }
        }

        let Some(ref entry_point) = skill.entry_point else {
            let mut result = ExecutionResult::new(request, Success);
            result.stdout = skill.guide.trim().to_string();
            return result;
        };

        self.spawn(request, &skill, entry_point, &root, &args, &args_value, ctx)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn(
        &self,
        request: &ToolCallRequest,
        skill: &SkillDescriptor,
        entry_point: &str,
        root: &Path,
        args: &Map<String, Value>,
        args_value: &Value,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        use ExecutionState::*;

        let language = skill.language.as_deref().unwrap_or("python");
        let Some(runtime) = self.runtimes.resolve(language) else {
            return ExecutionResult::with_stderr(
                request,
                Error,
                format!("no interpreter available for language '{}'", language),
            );
        };

        // A one-call session when the caller did not supply one.
        let owned_session = ctx.session_id.is_none().then(|| self.sessions.create_session());
        let session_id = ctx
            .session_id
            .clone()
            .or_else(|| owned_session.clone())
            .unwrap_or_default();

        let result = match self.sessions.create_call_dir(&session_id, &request.call_id) {
            Ok(temp_dir) => {
                let spec = LaunchSpec {
                    name: skill.name.clone(),
                    skill_dir: skill.bundle_dir.clone(),
                    entry_point: entry_point.to_string(),
                    runtime,
                    work_dir: root.to_path_buf(),
                    env: self.child_env(skill, root, &session_id, &temp_dir, args),
                    input_json: args_value.to_string(),
                };
                info_log!(skill = %skill.name, call_id = %request.call_id, backend = %self.backend.name(), "Executing skill");
                observability::audit_execution_started(&skill.name, &request.call_id, &session_id, &spec.command_line());
                match self.backend.execute(&spec, self.limits, ctx.cancel.as_ref()) {
                    Ok(output) => classify(request, output, self.limits.timeout_secs),
                    Err(e) => ExecutionResult::with_stderr(request, Error, format!("{:#}", e)),
                }
            }
            Err(e) => ExecutionResult::with_stderr(request, Error, format!("{:#}", e)),
        };

        if let Some(ref id) = owned_session {
            self.sessions.end_session(id);
        }
        result
    }

    fn child_env(
        &self,
        skill: &SkillDescriptor,
        root: &Path,
        session_id: &str,
        temp_dir: &Path,
        args: &Map<String, Value>,
    ) -> Vec<(String, String)> {
        let mut env = vec![
            ("SKILLS_HOME".to_string(), self.registry.root().to_string_lossy().into_owned()),
            ("CURRENT_SKILL_DIR".to_string(), skill.bundle_dir.to_string_lossy().into_owned()),
            ("SANDBOX_ROOT".to_string(), root.to_string_lossy().into_owned()),
            ("SKILL_SESSION_ID".to_string(), session_id.to_string()),
            ("SKILL_TEMP_DIR".to_string(), temp_dir.to_string_lossy().into_owned()),
            ("TMPDIR".to_string(), temp_dir.to_string_lossy().into_owned()),
        ];
        for (key, value) in args {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            env.push((format!("SKILL_PARAM_{}", env_key(key)), rendered));
        }
        env
    }
}

fn arguments_object(arguments: &Value) -> Option<Map<String, Value>> {
    match arguments {
        Value::Object(map) => Some(map.clone()),
        Value::Null => Some(Map::new()),
        _ => None,
    }
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn classify(request: &ToolCallRequest, output: ProcessOutput, timeout_secs: u64) -> ExecutionResult {
    let duration_ms = output.duration.as_millis() as u64;
    let (state, stderr) = match output.killed {
        Some(KillReason::Timeout) => (
            ExecutionState::Error,
            format!("Execution Timeout ({}s)", timeout_secs),
        ),
        Some(KillReason::Cancelled) => (ExecutionState::Error, "cancelled".to_string()),
        Some(KillReason::MemoryLimit) => (ExecutionState::Error, output.stderr.trim().to_string()),
        None if output.exit_code == Some(0) => (ExecutionState::Success, output.stderr.trim().to_string()),
        None => (ExecutionState::Failed, output.stderr.trim().to_string()),
    };
    ExecutionResult {
        call_id: request.call_id.clone(),
        skill_name: request.skill_name.clone(),
        state,
        stdout: output.stdout.trim().to_string(),
        stderr,
        exit_code: output.exit_code,
        risk_descriptor: None,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillbridge_core::config::HighRiskConfig;
    use skillbridge_core::skill::dependency::StaticProbe;
    use std::fs;

    const CONVERTER_MD: &str = r#"---
name: sample-converter
version: 1.0.0
description: Convert text case or count words
parameters:
  input_text: string
  operation: enum[uppercase,lowercase,titlecase,wordcount]
---
"#;

    const CONVERTER_SH: &str = r#"case "$SKILL_PARAM_OPERATION" in
  uppercase) printf '%s\n' "$SKILL_PARAM_INPUT_TEXT" | tr '[:lower:]' '[:upper:]' ;;
  lowercase) printf '%s\n' "$SKILL_PARAM_INPUT_TEXT" | tr '[:upper:]' '[:lower:]' ;;
  *) echo "unsupported" 1>&2; exit 2 ;;
esac
"#;

    const FILE_TOOL_MD: &str = r#"---
name: file-tool
description: Read or delete files in the workspace
parameters:
  path: path
  operation: enum[read,delete]
  recursive: boolean?
---
"#;

    const FILE_TOOL_SH: &str = r#"if [ "$SKILL_PARAM_OPERATION" = "read" ]; then cat "$SKILL_PARAM_PATH"; else rm -r "$SKILL_PARAM_PATH" && echo deleted; fi
"#;

    struct Fixture {
        _tmp: tempfile::TempDir,
        workspace: PathBuf,
        engine: ExecutionEngine,
    }

    fn bundle(root: &Path, name: &str, md: &str, script: Option<(&str, &str)>) {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("scripts")).unwrap();
        fs::write(dir.join("SKILL.md"), md).unwrap();
        if let Some((file, body)) = script {
            fs::write(dir.join("scripts").join(file), body).unwrap();
        }
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let skills = tmp.path().join("skills");
        let workspace = tmp.path().join("workspace");
        fs::create_dir_all(&workspace).unwrap();
        bundle(&skills, "sample-converter", CONVERTER_MD, Some(("main.sh", CONVERTER_SH)));
        bundle(&skills, "file-tool", FILE_TOOL_MD, Some(("main.sh", FILE_TOOL_SH)));
        bundle(
            &skills,
            "pandas-report",
            "---\nname: pandas-report\nruntime_requirements: [pandas]\n---\n",
            Some(("main.sh", "echo never\n")),
        );
        bundle(
            &skills,
            "style-guide",
            "---\nname: style-guide\ndescription: House style\n---\nUse short sentences.\n",
            None,
        );
        let registry = Registry::scan(&skills, Arc::new(StaticProbe::default())).unwrap();
        let engine = ExecutionEngine::new(Arc::new(registry), &workspace)
            .with_runtimes(Arc::new(RuntimePaths::detect()))
            .with_policy(HighRiskPolicy::new(HighRiskConfig::parse("all")))
            .with_limits(ResourceLimits {
                max_memory_mb: 512,
                timeout_secs: 10,
            })
            .with_sessions(Arc::new(SessionStore::with_temp_base(
                tmp.path().join("tmp"),
                Duration::from_secs(60),
            )));
        Fixture {
            _tmp: tmp,
            workspace,
            engine,
        }
    }

    fn has_shell() -> bool {
        RuntimePaths::detect().shell.is_some()
    }

    #[test]
    fn test_uppercase_success() {
        if !has_shell() {
            return;
        }
        let f = fixture();
        let req = ToolCallRequest::new(
            "call_1",
            "sample-converter",
            json!({"input_text": "hello", "operation": "uppercase"}),
        );
        let r = f.engine.run(&req, &ExecutionContext::default());
        assert_eq!(r.state, ExecutionState::Success, "stderr: {}", r.stderr);
        assert_eq!(r.stdout, "HELLO");
        assert_eq!(r.call_id, "call_1");
    }

    #[test]
    fn test_case_insensitive_argument_names() {
        if !has_shell() {
            return;
        }
        let f = fixture();
        let req = ToolCallRequest::new(
            "c",
            "Sample-Converter",
            json!({"Input_Text": "MiXeD", "OPERATION": "lowercase"}),
        );
        let r = f.engine.run(&req, &ExecutionContext::default());
        assert_eq!(r.stdout, "mixed");
    }

    #[test]
    fn test_nonzero_exit_is_failed_with_separate_stderr() {
        if !has_shell() {
            return;
        }
        let f = fixture();
        let req = ToolCallRequest::new(
            "c",
            "sample-converter",
            json!({"input_text": "x", "operation": "wordcount"}),
        );
        let r = f.engine.run(&req, &ExecutionContext::default());
        assert_eq!(r.state, ExecutionState::Failed);
        assert_eq!(r.stderr, "unsupported");
        assert!(r.stdout.is_empty());
        assert_eq!(r.exit_code, Some(2));
    }

    #[test]
    fn test_invalid_arguments_fail_without_spawning() {
        let f = fixture();
        let req = ToolCallRequest::new("c", "sample-converter", json!({"operation": "reverse"}));
        let r = f.engine.run(&req, &ExecutionContext::default());
        assert_eq!(r.state, ExecutionState::Failed);
        assert!(r.stderr.contains("input_text"));
    }

    #[test]
    fn test_path_escape_is_security_violation() {
        let f = fixture();
        let req = ToolCallRequest::new(
            "c",
            "file-tool",
            json!({"path": "../../etc/passwd", "operation": "read"}),
        );
        let r = f.engine.run(&req, &ExecutionContext::default());
        assert_eq!(r.state, ExecutionState::SecurityViolation);
        assert!(r.stdout.is_empty());
        assert!(r.exit_code.is_none());
    }

    #[test]
    fn test_symlink_escape_is_security_violation() {
        #[cfg(unix)]
        {
            let f = fixture();
            let outside = f._tmp.path().join("outside");
            fs::create_dir_all(&outside).unwrap();
            std::os::unix::fs::symlink(&outside, f.workspace.join("link")).unwrap();
            let req = ToolCallRequest::new(
                "c",
                "file-tool",
                json!({"path": "link/secret.txt", "operation": "read"}),
            );
            let r = f.engine.run(&req, &ExecutionContext::default());
            assert_eq!(r.state, ExecutionState::SecurityViolation);
        }
    }

    #[test]
    fn test_recursive_delete_requires_approval_and_mutates_nothing() {
        let f = fixture();
        fs::create_dir_all(f.workspace.join("build/out")).unwrap();
        let req = ToolCallRequest::new(
            "call_rm",
            "file-tool",
            json!({"path": "build", "operation": "delete", "recursive": true}),
        );
        let r = f.engine.run(&req, &ExecutionContext::default());
        assert_eq!(r.state, ExecutionState::RequiresApproval);
        let risk = r.risk_descriptor.unwrap();
        assert_eq!(risk.category, "destructive_fs");
        assert!(f.workspace.join("build/out").exists());

        if has_shell() {
            let approved = f.engine.run(&req, &ExecutionContext::default().approved());
            assert_eq!(approved.state, ExecutionState::Success, "stderr: {}", approved.stderr);
            assert!(!f.workspace.join("build").exists());
        }
    }

    #[test]
    fn test_degraded_and_unknown_skills_are_errors() {
        let f = fixture();
        let r = f.engine.run(
            &ToolCallRequest::new("c", "pandas-report", json!({})),
            &ExecutionContext::default(),
        );
        assert_eq!(r.state, ExecutionState::Error);
        assert!(r.stderr.contains("pandas"));

        let r = f.engine.run(
            &ToolCallRequest::new("c", "missing-skill", json!({})),
            &ExecutionContext::default(),
        );
        assert_eq!(r.state, ExecutionState::Error);
    }

    #[test]
    fn test_knowledge_skill_returns_guide() {
        let f = fixture();
        let r = f.engine.run(
            &ToolCallRequest::new("c", "style-guide", json!(null)),
            &ExecutionContext::default(),
        );
        assert_eq!(r.state, ExecutionState::Success);
        assert_eq!(r.stdout, "Use short sentences.");
    }

    #[test]
    fn test_session_temp_dirs_released() {
        if !has_shell() {
            return;
        }
        let f = fixture();
        let session = f.engine.sessions().create_session();
        let req = ToolCallRequest::new(
            "c1",
            "sample-converter",
            json!({"input_text": "a", "operation": "uppercase"}),
        );
        f.engine.run(&req, &ExecutionContext::in_session(session.clone()));
        assert_eq!(f.engine.sessions().tool_calls(&session).len(), 1);
        assert_eq!(f.engine.sessions().end_session(&session), 1);

        // One-call sessions are ended by the engine itself.
        f.engine.run(&req, &ExecutionContext::default());
        assert_eq!(f.engine.sessions().active_count(), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let f = fixture();
        let token = CancellationToken::new();
        token.cancel();
        let req = ToolCallRequest::new(
            "c",
            "sample-converter",
            json!({"input_text": "a", "operation": "uppercase"}),
        );
        let r = f.engine.run(&req, &ExecutionContext::default().with_cancel(token));
        assert_eq!(r.state, ExecutionState::Error);
        assert_eq!(r.stderr, "cancelled");
    }

    #[test]
    fn test_timeout_classified_as_error() {
        if !has_shell() {
            return;
        }
        let f = fixture();
        let skills = f.engine.registry().root().to_path_buf();
        bundle(
            &skills,
            "sleeper",
            "---\nname: sleeper\n---\n",
            Some(("main.sh", "sleep 30\n")),
        );
        f.engine.registry().reload(Some("sleeper"));
        let engine = ExecutionEngine::new(Arc::clone(f.engine.registry()), &f.workspace).with_limits(
            ResourceLimits {
                max_memory_mb: 512,
                timeout_secs: 1,
            },
        );
        let r = engine.run(&ToolCallRequest::new("c", "sleeper", json!({})), &ExecutionContext::default());
        assert_eq!(r.state, ExecutionState::Error);
        assert_eq!(r.stderr, "Execution Timeout (1s)");
    }

    #[test]
    fn test_idle_sessions_swept_on_next_call() {
        let f = fixture();
        let tmp = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::with_temp_base(
            tmp.path().join("sessions"),
            Duration::from_millis(50),
        ));
        let engine = ExecutionEngine::new(Arc::clone(f.engine.registry()), &f.workspace)
            .with_sessions(Arc::clone(&sessions));

        let abandoned = sessions.create_session();
        let dir = sessions.create_call_dir(&abandoned, "c0").unwrap();
        std::thread::sleep(Duration::from_millis(120));

        let live = sessions.create_session();
        // `live` is also past the TTL, but the call in it keeps it open.
        std::thread::sleep(Duration::from_millis(60));
        let r = engine.run(
            &ToolCallRequest::new("c1", "style-guide", json!({})),
            &ExecutionContext::in_session(live.clone()),
        );
        assert_eq!(r.state, ExecutionState::Success);
        assert!(!dir.exists());
        assert!(!sessions.exists(&abandoned));
        assert!(sessions.exists(&live));
        assert_eq!(sessions.tool_calls(&live).len(), 1);
    }

    #[test]
    fn test_background_child_cannot_extend_timeout() {
        if !has_shell() {
            return;
        }
        let f = fixture();
        let skills = f.engine.registry().root().to_path_buf();
        bundle(
            &skills,
            "detacher",
            "---\nname: detacher\n---\n",
            Some(("main.sh", "sleep 30 &\necho started\n")),
        );
        f.engine.registry().reload(Some("detacher"));
        let engine = ExecutionEngine::new(Arc::clone(f.engine.registry()), &f.workspace).with_limits(
            ResourceLimits {
                max_memory_mb: 512,
                timeout_secs: 1,
            },
        );
        let start = Instant::now();
        let r = engine.run(&ToolCallRequest::new("c", "detacher", json!({})), &ExecutionContext::default());
        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
        assert_eq!(r.state, ExecutionState::Success, "stderr: {}", r.stderr);
        assert_eq!(r.stdout, "started");
    }

    #[test]
    fn test_enum_argument_named_like_a_path_is_passed_through() {
        if !has_shell() {
            return;
        }
        let f = fixture();
        let skills = f.engine.registry().root().to_path_buf();
        bundle(
            &skills,
            "fmt",
            "---\nname: fmt\nparameters:\n  text: string\n  target: enum[json,yaml]\n---\n",
            Some(("main.sh", "printf '%s\\n' \"$SKILL_PARAM_TARGET\"\n")),
        );
        f.engine.registry().reload(Some("fmt"));
        let r = f.engine.run(
            &ToolCallRequest::new("c", "fmt", json!({"text": "x", "target": "json"})),
            &ExecutionContext::default(),
        );
        assert_eq!(r.state, ExecutionState::Success, "stderr: {}", r.stderr);
        assert_eq!(r.stdout, "json");
    }

    #[test]
    fn test_prose_with_parent_dir_reaches_the_skill() {
        if !has_shell() {
            return;
        }
        let f = fixture();
        let req = ToolCallRequest::new(
            "c",
            "sample-converter",
            json!({"input_text": "see ../notes", "operation": "uppercase"}),
        );
        let r = f.engine.run(&req, &ExecutionContext::default());
        assert_eq!(r.state, ExecutionState::Success, "stderr: {}", r.stderr);
        assert_eq!(r.stdout, "SEE ../NOTES");
    }
}
