use std::time::SystemTime;

use serde::Serialize;

use super::backend::BackendKind;
use super::process::ProcessSnapshot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub percent: f32,
}

impl MemoryStats {
    /// Build from a total and the bytes currently in use.
    pub fn from_used(total: u64, used: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (used.min(total) as f64 / total as f64 * 100.0) as f32
        };
        Self {
            total,
            available: total.saturating_sub(used),
            percent,
        }
    }
}

/// Disk throughput in MB/s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DiskRates {
    pub read_rate: f64,
    pub write_rate: f64,
}

/// Network throughput in MB/s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NetworkRates {
    pub sent_rate: f64,
    pub recv_rate: f64,
}

/// One internally consistent sampling cycle. The process list is replaced
/// wholesale each cycle and its order carries no meaning.
#[derive(Clone, Debug, Serialize)]
pub struct SystemSnapshot {
    pub cpu_percent: f32,
    pub memory: MemoryStats,
    pub disk: DiskRates,
    pub network: NetworkRates,
    /// MHz, 0 when unknown.
    pub cpu_frequency: u64,
    /// Seconds since the UNIX epoch.
    pub boot_time: u64,
    pub sampled_at: SystemTime,
    pub backend: BackendKind,
    pub processes: Vec<ProcessSnapshot>,
}

impl SystemSnapshot {
    /// A snapshot with no measurements, stamped now.
    pub fn empty(backend: BackendKind) -> Self {
        SystemSnapshot {
            cpu_percent: 0.0,
            memory: MemoryStats::default(),
            disk: DiskRates::default(),
            network: NetworkRates::default(),
            cpu_frequency: 0,
            boot_time: 0,
            sampled_at: SystemTime::now(),
            backend,
            processes: Vec::new(),
        }
    }

    /// Seconds elapsed since boot as of `sampled_at`.
    pub fn uptime_secs(&self) -> u64 {
        self.sampled_at
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs().saturating_sub(self.boot_time))
            .unwrap_or(0)
    }
}
