use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use super::platform;

/// Requests extended process-inspection rights so enumeration is not
/// silently truncated. Failure only narrows which processes are visible.
pub trait PrivilegeElevator: Send + Sync {
    fn elevate(&self) -> bool;
}

/// Enables the OS debug/inspection privilege on the current process token
/// where the platform has one.
#[derive(Debug, Default)]
pub struct OsPrivilegeElevator {
    reported: AtomicBool,
}

impl OsPrivilegeElevator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrivilegeElevator for OsPrivilegeElevator {
    fn elevate(&self) -> bool {
        let result = platform::enable_debug_privilege();
        // Outcome is logged once at info; repeats go to debug.
        let first = !self.reported.swap(true, Ordering::Relaxed);
        match result {
            Ok(()) => {
                if first {
                    info!("process inspection privilege enabled");
                } else {
                    debug!("process inspection privilege re-enabled");
                }
                true
            }
            Err(err) => {
                if first {
                    info!(error = %err, "process inspection privilege unavailable; some processes may be hidden");
                } else {
                    debug!(error = %err, "process inspection privilege unavailable");
                }
                false
            }
        }
    }
}

/// For platforms or callers that do not elevate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopElevator;

impl PrivilegeElevator for NoopElevator {
    fn elevate(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_elevator_never_panics_and_is_repeatable() {
        let elevator = OsPrivilegeElevator::new();
        let first = elevator.elevate();
        let second = elevator.elevate();
        assert_eq!(first, second);
    }

    #[test]
    fn noop_reports_failure() {
        assert!(!NoopElevator.elevate());
    }
}
