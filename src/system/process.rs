use serde::Serialize;

/// Pids below this are treated as belonging to the OS.
pub const SYSTEM_PID_THRESHOLD: u32 = 100;

/// Core OS process names (kernel, session, service and security subsystems).
const SYSTEM_PROCESS_NAMES: [&str; 12] = [
    "system",
    "registry",
    "smss.exe",
    "csrss.exe",
    "wininit.exe",
    "services.exe",
    "lsass.exe",
    "winlogon.exe",
    "kthreadd",
    "launchd",
    "init",
    "systemd",
];

/// Rates are MB/s; cpu is a share of the whole machine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub disk_read_rate: f64,
    pub disk_write_rate: f64,
    pub net_sent_rate: f64,
    pub net_recv_rate: f64,
    pub is_system: bool,
}

pub fn is_system_process(pid: u32, name: &str) -> bool {
    if pid < SYSTEM_PID_THRESHOLD {
        return true;
    }
    SYSTEM_PROCESS_NAMES
        .iter()
        .any(|system| system.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_pids_are_system() {
        assert!(is_system_process(4, "anything"));
        assert!(is_system_process(99, "user-app"));
        assert!(!is_system_process(100, "user-app"));
    }

    #[test]
    fn denylisted_names_are_system_regardless_of_case() {
        assert!(is_system_process(5000, "csrss.exe"));
        assert!(is_system_process(5000, "LSASS.EXE"));
        assert!(is_system_process(5000, "Registry"));
        assert!(!is_system_process(5000, "explorer.exe"));
    }
}
