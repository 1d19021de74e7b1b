//! Child-process supervision shared by every backend.
//!
//! The child is expected to lead its own process group, so a timeout,
//! memory overrun or cancellation kills everything it spawned.

use anyhow::Result;
use std::io::Read;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ============================================================
// Resource Limits Constants (Single Source of Truth)
// ============================================================

/// Default maximum memory limit in MB
pub const DEFAULT_MAX_MEMORY_MB: u64 = 256;

/// Default execution timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Poll interval for exit, memory and cancellation checks
pub const POLL_INTERVAL_MS: u64 = 50;

/// How long the output readers may keep running once the group is gone
pub const DRAIN_GRACE_MS: u64 = 500;

/// Why the supervisor killed the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    Timeout,
    MemoryLimit,
    Cancelled,
}

/// Captured result of one supervised child. stdout and stderr are kept apart.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub killed: Option<KillReason>,
    pub duration: Duration,
}

/// Get memory usage of a process in bytes (macOS: `ps -o rss=`)
#[cfg(target_os = "macos")]
pub fn get_process_memory(pid: u32) -> Option<u64> {
    use std::process::Command;

    let output = Command::new("ps")
        .args(["-o", "rss=", "-p", &pid.to_string()])
        .output()
        .ok()?;

    if output.status.success() {
        let rss_str = String::from_utf8_lossy(&output.stdout);
        // ps returns RSS in KB
        if let Ok(rss_kb) = rss_str.trim().parse::<u64>() {
            return Some(rss_kb * 1024);
        }
    }

    None
}

/// Get memory usage of a process in bytes (Linux: VmRSS from /proc/<pid>/status)
#[cfg(target_os = "linux")]
pub fn get_process_memory(pid: u32) -> Option<u64> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;

    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest
                .split_whitespace()
                .next()
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb * 1024);
        }
    }

    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn get_process_memory(_pid: u32) -> Option<u64> {
    None
}

/// SIGKILL every process left in the group led by `pid`.
fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the child's whole process group, then reap the child.
pub fn kill_process_tree(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

/// Join a reader thread, giving up at `deadline`. A reader still blocked
/// then is left behind with whatever it has not returned yet.
fn collect(handle: Option<thread::JoinHandle<String>>, deadline: Instant) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!("output reader still blocked after the process group was killed");
            return String::new();
        }
        thread::sleep(Duration::from_millis(10));
    }
    handle.join().unwrap_or_default()
}

/// Wait for the child with timeout, memory and cancellation checks.
///
/// stdout and stderr are drained on background threads while the child
/// runs; a child that fills a pipe buffer would otherwise block forever.
pub fn wait_with_timeout(
    child: &mut Child,
    timeout_secs: u64,
    memory_limit_bytes: u64,
    cancel: Option<&CancellationToken>,
) -> Result<ProcessOutput> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    let check_interval = Duration::from_millis(POLL_INTERVAL_MS);

    let stdout_handle = child.stdout.take().map(|out| thread::spawn(move || drain(out)));
    let stderr_handle = child.stderr.take().map(|err| thread::spawn(move || drain(err)));

    let grace = Duration::from_millis(DRAIN_GRACE_MS);

    let killed = loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                // Background leftovers would hold the pipes open past the timeout.
                kill_group(child.id());
                let deadline = Instant::now() + grace;
                return Ok(ProcessOutput {
                    stdout: collect(stdout_handle, deadline),
                    stderr: collect(stderr_handle, deadline),
                    exit_code: status.code(),
                    killed: None,
                    duration: start.elapsed(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                kill_process_tree(child);
                let deadline = Instant::now() + grace;
                let _ = collect(stdout_handle, deadline);
                let _ = collect(stderr_handle, deadline);
                return Err(anyhow::anyhow!("Failed to wait for process: {}", e));
            }
        }

        if cancel.is_some_and(|c| c.is_cancelled()) {
            break KillReason::Cancelled;
        }
        if start.elapsed() > timeout {
            break KillReason::Timeout;
        }
        if get_process_memory(child.id()).is_some_and(|m| m > memory_limit_bytes) {
            break KillReason::MemoryLimit;
        }

        thread::sleep(check_interval);
    };

    kill_process_tree(child);
    let deadline = Instant::now() + grace;
    let stdout = collect(stdout_handle, deadline);
    let mut stderr = collect(stderr_handle, deadline);
    let note = match killed {
        KillReason::Timeout => format!("Process killed: exceeded timeout of {} seconds", timeout_secs),
        KillReason::MemoryLimit => format!(
            "Process killed: memory usage exceeded limit ({} MB)",
            memory_limit_bytes / (1024 * 1024)
        ),
        KillReason::Cancelled => "Process killed: execution cancelled".to_string(),
    };
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(&note);

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code: None,
        killed: Some(killed),
        duration: start.elapsed(),
    })
}

fn drain<R: Read>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
