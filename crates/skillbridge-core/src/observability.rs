//! Observability: tracing init, audit log, security events.
//!
//! Uses config::ObservabilityConfig for SKILLBRIDGE_QUIET, LOG_LEVEL, AUDIT_LOG, etc.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);
static SECURITY_EVENTS_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Tracing initialization mode.
#[derive(Clone, Copy, Debug)]
pub enum TracingMode {
    /// Default: use SKILLBRIDGE_LOG_LEVEL / SKILLBRIDGE_QUIET from env
    Default,
    /// Interactive chat: keep loop-internal info out of the terminal
    Chat,
}

/// Initialize tracing. Call at process startup.
/// When SKILLBRIDGE_QUIET=1, only WARN and above are logged.
pub fn init_tracing(mode: TracingMode) {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let mut level: String = if cfg.quiet {
        "skillbridge=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    if matches!(mode, TracingMode::Chat) {
        level = format!("{},skillbridge_agent=warn", level);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn resolve_log_path(slot: &Mutex<Option<String>>, configured: Option<&String>) -> Option<String> {
    {
        let guard = slot.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = configured?.clone();
    if path.is_empty() {
        return None;
    }
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let mut guard = slot.lock().ok()?;
    *guard = Some(path.clone());
    Some(path)
}

fn get_audit_path() -> Option<String> {
    let cfg = crate::config::ObservabilityConfig::from_env();
    resolve_log_path(&AUDIT_PATH, cfg.audit_log.as_ref())
}

fn get_security_events_path() -> Option<String> {
    let cfg = crate::config::ObservabilityConfig::from_env();
    resolve_log_path(&SECURITY_EVENTS_PATH, cfg.security_events_log.as_ref())
}

fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

fn audit(record: serde_json::Value) {
    if let Some(path) = get_audit_path() {
        append_jsonl(&path, &record);
    }
}

/// Audit: execution_started (right before spawn)
pub fn audit_execution_started(skill: &str, call_id: &str, session_id: &str, cmd: &str) {
    audit(json!({
        "ts": now_ts(),
        "event": "execution_started",
        "skill": skill,
        "call_id": call_id,
        "session_id": session_id,
        "cmd": cmd,
    }));
}

/// Audit: execution_completed with the classified state
pub fn audit_execution_completed(
    skill: &str,
    call_id: &str,
    state: &str,
    exit_code: Option<i32>,
    duration_ms: u64,
    stdout_len: usize,
) {
    audit(json!({
        "ts": now_ts(),
        "event": "execution_completed",
        "skill": skill,
        "call_id": call_id,
        "state": state,
        "exit_code": exit_code,
        "duration_ms": duration_ms,
        "stdout_len": stdout_len,
    }));
}

/// Audit: approval_requested (loop suspended on a high-risk call)
pub fn audit_approval_requested(skill: &str, call_id: &str, reason: &str) {
    audit(json!({
        "ts": now_ts(),
        "event": "approval_requested",
        "skill": skill,
        "call_id": call_id,
        "reason": reason,
    }));
}

/// Audit: approval_decision. `source` is "user", "expired" or "cancelled".
pub fn audit_approval_decision(call_id: &str, approved: bool, source: &str) {
    audit(json!({
        "ts": now_ts(),
        "event": "approval_decision",
        "call_id": call_id,
        "approved": approved,
        "source": source,
    }));
}

/// Audit: registry_reloaded
pub fn audit_registry_reloaded(scope: &str, generation: u64, skills: usize, rejected: usize) {
    audit(json!({
        "ts": now_ts(),
        "event": "registry_reloaded",
        "scope": scope,
        "generation": generation,
        "skills": skills,
        "rejected": rejected,
    }));
}

/// Security event: an argument resolved outside the sandbox root
pub fn security_path_violation(skill: &str, call_id: &str, argument: &str, reason: &str) {
    tracing::warn!(
        skill = %skill,
        call_id = %call_id,
        argument = %argument,
        reason = %reason,
        "Security: path escapes sandbox root"
    );
    if let Some(path) = get_security_events_path() {
        append_jsonl(
            &path,
            &json!({
                "ts": now_ts(),
                "type": "security_path_violation",
                "category": "filesystem",
                "skill": skill,
                "call_id": call_id,
                "details": { "argument": argument, "reason": reason }
            }),
        );
    }
}

/// Security event: bundle directory and declared name disagree
pub fn security_integrity_error(dir_name: &str, declared: &str) {
    tracing::warn!(
        dir_name = %dir_name,
        declared = %declared,
        "Security: skill bundle name mismatch, bundle not catalogued"
    );
    if let Some(path) = get_security_events_path() {
        append_jsonl(
            &path,
            &json!({
                "ts": now_ts(),
                "type": "security_integrity_error",
                "category": "registry",
                "details": { "dir_name": dir_name, "declared": declared }
            }),
        );
    }
}
