//! One-shot process termination. Does not touch any snapshot; the next poll
//! reflects the process's absence.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};
use tracing::info;

use super::platform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminateResult {
    Success(u32),
    Failed(u32, String),
    NotFound(u32),
}

/// Request termination rights, then terminate `pid`.
pub fn terminate_process(pid: u32) -> TerminateResult {
    // Best effort: without it only our own processes can be terminated.
    let _ = platform::enable_debug_privilege();

    let sysinfo_pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[sysinfo_pid]),
        true,
        ProcessRefreshKind::nothing(),
    );

    let result = match sys.process(sysinfo_pid) {
        Some(process) => match process.kill_with(Signal::Kill) {
            Some(true) => TerminateResult::Success(pid),
            Some(false) => TerminateResult::Failed(
                pid,
                format!("Failed to terminate PID {pid} (permission denied?)"),
            ),
            None => {
                // Signal not supported on this platform, fall back to kill()
                if process.kill() {
                    TerminateResult::Success(pid)
                } else {
                    TerminateResult::Failed(pid, format!("Failed to terminate PID {pid}"))
                }
            }
        },
        None => TerminateResult::NotFound(pid),
    };
    info!(pid, result = ?result, "terminate requested");
    result
}
