use std::collections::HashSet;
use std::time::Instant;

use sysinfo::{
    MINIMUM_CPU_UPDATE_INTERVAL, Networks, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate,
    System,
};
use tracing::{debug, debug_span, trace};

use super::{BackendKind, BackendSample, CollectError, MetricsBackend, ProbeError, to_mb_per_sec};
use crate::system::cpu::{CpuTimes, busy_percent};
use crate::system::platform::{self, IoStats};
use crate::system::process::{ProcessSnapshot, is_system_process};
use crate::system::rate::{CounterKind, EntityId, RateDeriver};
use crate::system::snapshot::{DiskRates, MemoryStats, NetworkRates};

/// Share of a process's non-storage I/O attributed to sending. The OS does
/// not attribute network traffic per process on this path; the split is an
/// approximation, not a measurement.
pub const OTHER_IO_SENT_SHARE: f64 = 0.4;

/// Raw cumulative counters for one process.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessCounters {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub io: IoStats,
}

/// Everything read from the OS in one pass, before any rate is derived.
#[derive(Clone, Debug)]
pub struct GenericReading {
    pub at: Instant,
    pub cpu_percent: f32,
    pub memory: MemoryStats,
    /// `None` when the OS exposes no system-wide disk counters; process
    /// rates are summed instead.
    pub disk_totals: Option<IoStats>,
    pub net_sent_total: u64,
    pub net_recv_total: u64,
    pub processes: Vec<Result<ProcessCounters, (u32, ProbeError)>>,
}

pub struct GenericEnumerationBackend {
    sys: System,
    networks: Networks,
    cpu_count: usize,
    previous_cpu: Option<CpuTimes>,
    last_refresh: Instant,
}

impl Default for GenericEnumerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GenericEnumerationBackend {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        let cpu_count = sys.cpus().len().max(1);
        GenericEnumerationBackend {
            sys,
            networks: Networks::new_with_refreshed_list(),
            cpu_count,
            previous_cpu: platform::cpu_times(),
            last_refresh: Instant::now(),
        }
    }

    /// CPU figures need two readings some distance apart; wait out the rest
    /// of that distance if the previous refresh was too recent.
    fn settle(&self) {
        let since = self.last_refresh.elapsed();
        if since < MINIMUM_CPU_UPDATE_INTERVAL {
            std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
    }

    fn refresh(&mut self) {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_usage();
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_memory()
                .with_cpu()
                .with_disk_usage(),
        );
        self.networks.refresh(true);
        self.last_refresh = Instant::now();
    }

    fn system_cpu(&mut self) -> f32 {
        let current = platform::cpu_times();
        let from_counters = match (self.previous_cpu, current) {
            (Some(previous), Some(current)) => busy_percent(&previous, &current),
            _ => None,
        };
        if current.is_some() {
            self.previous_cpu = current;
        }
        from_counters.unwrap_or_else(|| self.sys.global_cpu_usage())
    }

    fn read(&mut self) -> GenericReading {
        let at = Instant::now();
        let cpu_percent = self.system_cpu();

        let total = self.sys.total_memory();
        let used = total.saturating_sub(self.sys.available_memory());

        let mut net_sent_total = 0u64;
        let mut net_recv_total = 0u64;
        for (_, data) in &self.networks {
            net_sent_total = net_sent_total.saturating_add(data.total_transmitted());
            net_recv_total = net_recv_total.saturating_add(data.total_received());
        }

        let cpu_count = self.cpu_count as f32;
        let processes = self
            .sys
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| {
                let pid = pid.as_u32();
                if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
                    return Err((pid, ProbeError::Gone));
                }
                let name = process.name().to_string_lossy().to_string();
                if name.is_empty() {
                    return Err((pid, ProbeError::AccessDenied));
                }
                let io = platform::process_io(pid).unwrap_or_else(|| {
                    let usage = process.disk_usage();
                    IoStats {
                        read_bytes: usage.total_read_bytes,
                        write_bytes: usage.total_written_bytes,
                        other_bytes: None,
                    }
                });
                Ok(ProcessCounters {
                    pid,
                    name,
                    cpu_percent: process.cpu_usage() / cpu_count,
                    memory_bytes: process.memory(),
                    io,
                })
            })
            .collect();

        GenericReading {
            at,
            cpu_percent,
            memory: MemoryStats::from_used(total, used),
            disk_totals: platform::system_disk_io(),
            net_sent_total,
            net_recv_total,
            processes,
        }
    }
}

impl MetricsBackend for GenericEnumerationBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GenericFallback
    }

    fn collect(&mut self, rates: &mut RateDeriver) -> Result<BackendSample, CollectError> {
        let _span = debug_span!("backend.collect", backend = "generic").entered();
        self.settle();
        self.refresh();
        let sample = assemble(self.read(), rates);
        debug!(
            processes = sample.processes.len(),
            omitted = sample.omitted,
            "generic collection finished"
        );
        Ok(sample)
    }
}

/// Turn one reading into rates. Processes whose probe failed are left out.
pub fn assemble(reading: GenericReading, rates: &mut RateDeriver) -> BackendSample {
    let at = reading.at;
    let mut sample = BackendSample {
        cpu_percent: reading.cpu_percent,
        memory: reading.memory,
        processes: Vec::with_capacity(reading.processes.len()),
        ..BackendSample::default()
    };

    // Baselines follow enumeration, not probe success.
    let enumerated: HashSet<u32> = reading
        .processes
        .iter()
        .map(|probe| match probe {
            Ok(counters) => counters.pid,
            Err((pid, _)) => *pid,
        })
        .collect();

    let mut summed_read = 0.0;
    let mut summed_write = 0.0;

    for probe in reading.processes {
        let counters = match probe {
            Ok(counters) => counters,
            Err((pid, err)) => {
                trace!(pid, error = %err, "process omitted");
                sample.omitted += 1;
                continue;
            }
        };
        let entity = EntityId::Process(counters.pid);
        let read = rates.derive(CounterKind::DiskRead, entity, counters.io.read_bytes, at);
        let write = rates.derive(CounterKind::DiskWrite, entity, counters.io.write_bytes, at);
        let other = counters
            .io
            .other_bytes
            .map(|bytes| rates.derive(CounterKind::OtherIo, entity, bytes, at))
            .unwrap_or(0.0);
        summed_read += read;
        summed_write += write;

        sample.processes.push(ProcessSnapshot {
            pid: counters.pid,
            is_system: is_system_process(counters.pid, &counters.name),
            name: counters.name,
            cpu_percent: counters.cpu_percent,
            memory_bytes: counters.memory_bytes,
            disk_read_rate: to_mb_per_sec(read),
            disk_write_rate: to_mb_per_sec(write),
            net_sent_rate: to_mb_per_sec(other * OTHER_IO_SENT_SHARE),
            net_recv_rate: to_mb_per_sec(other * (1.0 - OTHER_IO_SENT_SHARE)),
        });
    }

    rates.evict_missing(&enumerated);

    let (disk_read, disk_write) = match reading.disk_totals {
        Some(totals) => (
            rates.derive(CounterKind::DiskRead, EntityId::System, totals.read_bytes, at),
            rates.derive(CounterKind::DiskWrite, EntityId::System, totals.write_bytes, at),
        ),
        None => (summed_read, summed_write),
    };
    sample.disk = DiskRates {
        read_rate: to_mb_per_sec(disk_read),
        write_rate: to_mb_per_sec(disk_write),
    };
    sample.network = NetworkRates {
        sent_rate: to_mb_per_sec(rates.derive(
            CounterKind::NetSent,
            EntityId::System,
            reading.net_sent_total,
            at,
        )),
        recv_rate: to_mb_per_sec(rates.derive(
            CounterKind::NetReceived,
            EntityId::System,
            reading.net_recv_total,
            at,
        )),
    };

    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::rate::FIRST_SAMPLE_RATE;
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    fn counters(pid: u32, read: u64, other: Option<u64>) -> ProcessCounters {
        ProcessCounters {
            pid,
            name: format!("proc{pid}"),
            cpu_percent: 1.0,
            memory_bytes: 1000,
            io: IoStats {
                read_bytes: read,
                write_bytes: 0,
                other_bytes: other,
            },
        }
    }

    fn reading(at: Instant, net: u64, processes: Vec<Result<ProcessCounters, (u32, ProbeError)>>) -> GenericReading {
        GenericReading {
            at,
            cpu_percent: 12.5,
            memory: MemoryStats::from_used(4000, 1000),
            disk_totals: None,
            net_sent_total: net,
            net_recv_total: net,
            processes,
        }
    }

    #[test]
    fn first_cycle_reports_placeholders() {
        let mut rates = RateDeriver::new();
        let sample = assemble(reading(Instant::now(), 0, vec![Ok(counters(500, 10 * MB, None))]), &mut rates);
        let p = &sample.processes[0];
        assert_eq!(p.disk_read_rate, to_mb_per_sec(FIRST_SAMPLE_RATE));
        assert_eq!(sample.network.sent_rate, to_mb_per_sec(FIRST_SAMPLE_RATE));
        assert_eq!(sample.cpu_percent, 12.5);
    }

    #[test]
    fn second_cycle_reports_mb_per_second() {
        let mut rates = RateDeriver::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(2);
        assemble(reading(t0, 0, vec![Ok(counters(500, 0, Some(0)))]), &mut rates);
        let sample = assemble(
            reading(t1, 4 * MB, vec![Ok(counters(500, 8 * MB, Some(10 * MB)))]),
            &mut rates,
        );

        let p = &sample.processes[0];
        assert!((p.disk_read_rate - 4.0).abs() < 1e-9);
        assert!((p.net_sent_rate - 2.0).abs() < 1e-9);
        assert!((p.net_recv_rate - 3.0).abs() < 1e-9);
        assert!((sample.disk.read_rate - 4.0).abs() < 1e-9);
        assert!((sample.network.recv_rate - 2.0).abs() < 1e-9);
    }

    #[test]
    fn failed_probe_is_omitted_without_touching_others() {
        let mut rates = RateDeriver::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        assemble(reading(t0, 0, vec![Ok(counters(1, 0, None)), Ok(counters(2, 0, None))]), &mut rates);
        let sample = assemble(
            reading(t1, 0, vec![Ok(counters(1, MB, None)), Err((2, ProbeError::AccessDenied))]),
            &mut rates,
        );

        assert_eq!(sample.omitted, 1);
        assert_eq!(sample.processes.len(), 1);
        assert_eq!(sample.processes[0].pid, 1);
        assert!((sample.disk.read_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn system_disk_counters_take_precedence_over_summing() {
        let mut rates = RateDeriver::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        let mut first = reading(t0, 0, vec![Ok(counters(1, 0, None))]);
        first.disk_totals = Some(IoStats { read_bytes: 0, write_bytes: 0, other_bytes: None });
        assemble(first, &mut rates);

        let mut second = reading(t1, 0, vec![Ok(counters(1, MB, None))]);
        second.disk_totals = Some(IoStats { read_bytes: 5 * MB, write_bytes: MB, other_bytes: None });
        let sample = assemble(second, &mut rates);

        assert!((sample.disk.read_rate - 5.0).abs() < 1e-9);
        assert!((sample.disk.write_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn exited_processes_lose_their_baseline() {
        let mut rates = RateDeriver::new();
        let t0 = Instant::now();
        assemble(reading(t0, 0, vec![Ok(counters(1, 0, None)), Ok(counters(2, 0, None))]), &mut rates);
        let before = rates.tracked();
        assemble(reading(t0 + Duration::from_secs(1), 0, vec![Ok(counters(1, 0, None))]), &mut rates);
        assert!(rates.tracked() < before);
    }

    #[test]
    fn omitted_but_enumerated_process_keeps_its_baseline() {
        let mut rates = RateDeriver::new();
        let t0 = Instant::now();
        assemble(reading(t0, 0, vec![Ok(counters(1, 0, None)), Ok(counters(2, 0, None))]), &mut rates);

        let denied = reading(
            t0 + Duration::from_secs(1),
            0,
            vec![Ok(counters(1, 0, None)), Err((2, ProbeError::AccessDenied))],
        );
        let retried = denied.clone();
        assert_eq!(retried.processes[1], Err((2, ProbeError::AccessDenied)));
        let sample = assemble(denied, &mut rates);
        assert_eq!(sample.omitted, 1);

        let sample = assemble(
            reading(t0 + Duration::from_secs(2), 0, vec![Ok(counters(1, 0, None)), Ok(counters(2, 2 * MB, None))]),
            &mut rates,
        );
        let p2 = sample.processes.iter().find(|p| p.pid == 2).unwrap();
        assert!((p2.disk_read_rate - 1.0).abs() < 1e-9);
        assert_ne!(p2.disk_read_rate, to_mb_per_sec(FIRST_SAMPLE_RATE));
    }

    #[test]
    fn live_backend_collects_current_process() {
        let mut backend = GenericEnumerationBackend::new();
        let mut rates = RateDeriver::new();
        let sample = backend.collect(&mut rates).unwrap();
        assert_eq!(backend.kind(), BackendKind::GenericFallback);
        assert!(sample.memory.total > 0);
        assert!((0.0..=100.0).contains(&sample.cpu_percent));
        assert!(sample.processes.iter().any(|p| p.pid == std::process::id()));
    }
}
