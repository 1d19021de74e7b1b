//! Per-session tracking of tool calls and temporary artifacts.
//!
//! Every temp path registered with a session is removed when the session
//! ends, whichever state its calls reached. Idle sessions are swept after
//! the configured TTL.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub skill: String,
    pub state: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct Session {
    created_at: DateTime<Utc>,
    last_active: Instant,
    temp_paths: Vec<PathBuf>,
    calls: Vec<ToolCallRecord>,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    temp_base: PathBuf,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_temp_base(std::env::temp_dir().join("skillbridge"), ttl)
    }

    /// Store whose per-call directories live under `temp_base`.
    pub fn with_temp_base(temp_base: PathBuf, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            temp_base,
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// New session with a short random id.
    pub fn create_session(&self) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        self.lock().insert(
            id.clone(),
            Session {
                created_at: Utc::now(),
                last_active: Instant::now(),
                temp_paths: Vec::new(),
                calls: Vec::new(),
            },
        );
        tracing::debug!(session_id = %id, "session created");
        id
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    /// Mark the session as in use so a sweep does not end it.
    pub fn touch(&self, session_id: &str) {
        if let Some(s) = self.lock().get_mut(session_id) {
            s.last_active = Instant::now();
        }
    }

    pub fn record_tool_call(&self, session_id: &str, call_id: &str, skill: &str, state: &str) {
        if let Some(s) = self.lock().get_mut(session_id) {
            s.last_active = Instant::now();
            s.calls.push(ToolCallRecord {
                call_id: call_id.to_string(),
                skill: skill.to_string(),
                state: state.to_string(),
                at: Utc::now(),
            });
        }
    }

    pub fn tool_calls(&self, session_id: &str) -> Vec<ToolCallRecord> {
        self.lock()
            .get(session_id)
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// Track `path` for removal when the session ends. Unknown sessions
    /// remove the path immediately.
    pub fn register_temp_path(&self, session_id: &str, path: &Path) {
        let tracked = match self.lock().get_mut(session_id) {
            Some(s) => {
                s.last_active = Instant::now();
                s.temp_paths.push(path.to_path_buf());
                true
            }
            None => false,
        };
        if !tracked {
            remove_path(path);
        }
    }

    /// Create and register a fresh temp directory for one call.
    pub fn create_call_dir(&self, session_id: &str, call_id: &str) -> Result<PathBuf> {
        let safe: String = call_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(48)
            .collect();
        let dir = self.temp_base.join(session_id).join(format!(
            "{}-{}",
            safe,
            &uuid::Uuid::new_v4().simple().to_string()[..6]
        ));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create temp dir {}", dir.display()))?;
        self.register_temp_path(session_id, &dir);
        Ok(dir)
    }

    /// End the session and delete every registered path. Returns how many
    /// paths were removed.
    pub fn end_session(&self, session_id: &str) -> usize {
        let Some(session) = self.lock().remove(session_id) else {
            return 0;
        };
        let mut removed = 0;
        for path in &session.temp_paths {
            if remove_path(path) {
                removed += 1;
            }
        }
        let session_dir = self.temp_base.join(session_id);
        let _ = fs::remove_dir(&session_dir);
        tracing::debug!(
            session_id = %session_id,
            started = %session.created_at,
            calls = session.calls.len(),
            removed,
            "session ended"
        );
        removed
    }

    /// End sessions idle longer than the TTL. Returns their ids.
    pub fn sweep_expired(&self) -> Vec<String> {
        let expired: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, s)| s.last_active.elapsed() > self.ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            tracing::info!(session_id = %id, "session expired");
            self.end_session(id);
        }
        expired
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }
}

fn remove_path(path: &Path) -> bool {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp artifact");
            false
        }
    }
}

/// Ends its session on drop.
pub struct SessionGuard {
    store: Arc<SessionStore>,
    id: String,
}

impl SessionGuard {
    pub fn new(store: Arc<SessionStore>) -> Self {
        let id = store.create_session();
        Self { store, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.store.end_session(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl: Duration) -> (tempfile::TempDir, Arc<SessionStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let s = SessionStore::with_temp_base(tmp.path().join("sessions"), ttl);
        (tmp, Arc::new(s))
    }

    #[test]
    fn test_end_session_removes_registered_paths() {
        let (tmp, store) = store(Duration::from_secs(60));
        let id = store.create_session();
        assert_eq!(id.len(), 8);

        let dir = store.create_call_dir(&id, "call_1").unwrap();
        fs::write(dir.join("out.txt"), "x").unwrap();
        let file = tmp.path().join("scratch.bin");
        fs::write(&file, "y").unwrap();
        store.register_temp_path(&id, &file);
        store.record_tool_call(&id, "call_1", "sample-converter", "success");
        assert_eq!(store.tool_calls(&id).len(), 1);

        assert_eq!(store.end_session(&id), 2);
        assert!(!dir.exists());
        assert!(!file.exists());
        assert!(!store.exists(&id));
        assert_eq!(store.end_session(&id), 0);
    }

    #[test]
    fn test_guard_cleans_up_on_drop() {
        let (_tmp, store) = store(Duration::from_secs(60));
        let dir;
        {
            let guard = SessionGuard::new(Arc::clone(&store));
            dir = store.create_call_dir(guard.id(), "c").unwrap();
            assert!(dir.exists());
        }
        assert!(!dir.exists());
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_sweep_expired() {
        let (_tmp, store) = store(Duration::from_millis(0));
        let id = store.create_session();
        let dir = store.create_call_dir(&id, "c").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.sweep_expired(), vec![id]);
        assert!(!dir.exists());
    }

    #[test]
    fn test_touch_keeps_session_alive() {
        let (_tmp, store) = store(Duration::from_millis(200));
        let id = store.create_session();
        std::thread::sleep(Duration::from_millis(120));
        store.touch(&id);
        std::thread::sleep(Duration::from_millis(120));
        assert!(store.sweep_expired().is_empty());
        assert!(store.exists(&id));
    }
}
