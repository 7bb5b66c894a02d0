use std::collections::HashSet;
use std::io;

use sysinfo::System;
use tracing::{debug, debug_span, trace};

use super::{BackendKind, BackendSample, CollectError, MetricsBackend, ProbeError};
use crate::system::platform;
use crate::system::process::{ProcessSnapshot, is_system_process};
use crate::system::rate::RateDeriver;
use crate::system::snapshot::{DiskRates, MemoryStats, NetworkRates};

/// Default size of the per-cycle probe pool.
pub const DEFAULT_PROBE_WORKERS: usize = 4;

/// One process as reported by the helper. Rates are MB/s.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NativeProcessRecord {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub disk_read_rate: f64,
    pub disk_write_rate: f64,
    pub net_sent_rate: f64,
    pub net_recv_rate: f64,
}

/// Anything that can answer "what is pid X doing right now". Implemented by
/// the loaded helper library.
pub trait ProcessInfoSource: Send + Sync {
    fn query(&self, pid: u32) -> Result<NativeProcessRecord, ProbeError>;

    fn pids(&self) -> io::Result<Vec<u32>> {
        platform::enumerate_pids()
    }
}

pub struct NativeLibraryBackend {
    source: Box<dyn ProcessInfoSource>,
    workers: usize,
    physical_memory: u64,
}

impl NativeLibraryBackend {
    pub fn new(source: Box<dyn ProcessInfoSource>, workers: usize) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self {
            source,
            workers: workers.max(1),
            physical_memory: sys.total_memory(),
        }
    }

    /// Override the physical memory size used for memory percentages.
    pub fn with_physical_memory(mut self, bytes: u64) -> Self {
        self.physical_memory = bytes;
        self
    }
}

impl MetricsBackend for NativeLibraryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeLibrary
    }

    fn collect(&mut self, rates: &mut RateDeriver) -> Result<BackendSample, CollectError> {
        let _span = debug_span!("backend.collect", backend = "native").entered();

        let pids: Vec<u32> = self.source.pids()?.into_iter().filter(|&pid| pid != 0).collect();
        let results = probe_all(self.source.as_ref(), &pids, self.workers)?;

        let mut sample = BackendSample {
            processes: Vec::with_capacity(results.len()),
            ..BackendSample::default()
        };
        let mut cpu_total = 0.0f64;
        let mut memory_used = 0u64;
        let mut disk = DiskRates::default();
        let mut network = NetworkRates::default();

        for (pid, result) in results {
            let record = match result {
                Ok(record) if !record.name.is_empty() => record,
                Ok(_) => {
                    trace!(pid, error = %ProbeError::Unnamed, "process omitted");
                    sample.omitted += 1;
                    continue;
                }
                Err(err) => {
                    trace!(pid, error = %err, "process omitted");
                    sample.omitted += 1;
                    continue;
                }
            };

            cpu_total += record.cpu_percent;
            memory_used = memory_used.saturating_add(record.memory_bytes);
            disk.read_rate += record.disk_read_rate;
            disk.write_rate += record.disk_write_rate;
            network.sent_rate += record.net_sent_rate;
            network.recv_rate += record.net_recv_rate;

            sample.processes.push(ProcessSnapshot {
                pid,
                is_system: is_system_process(pid, &record.name),
                name: record.name,
                cpu_percent: record.cpu_percent as f32,
                memory_bytes: record.memory_bytes,
                disk_read_rate: record.disk_read_rate,
                disk_write_rate: record.disk_write_rate,
                net_sent_rate: record.net_sent_rate,
                net_recv_rate: record.net_recv_rate,
            });
        }

        // The helper tracks its own deltas; only keep the shared state bounded.
        let enumerated: HashSet<u32> = pids.iter().copied().collect();
        rates.evict_missing(&enumerated);

        sample.cpu_percent = cpu_total.min(100.0) as f32;
        sample.memory = MemoryStats::from_used(self.physical_memory, memory_used);
        sample.disk = disk;
        sample.network = network;

        debug!(
            processes = sample.processes.len(),
            omitted = sample.omitted,
            "native collection finished"
        );
        Ok(sample)
    }
}

type ProbeResult = (u32, Result<NativeProcessRecord, ProbeError>);

/// Query every pid, spreading the work over at most `workers` threads. All
/// results are merged before returning.
fn probe_all(
    source: &dyn ProcessInfoSource,
    pids: &[u32],
    workers: usize,
) -> Result<Vec<ProbeResult>, CollectError> {
    if workers <= 1 || pids.len() <= workers {
        return Ok(pids.iter().map(|&pid| (pid, source.query(pid))).collect());
    }

    let chunk_size = pids.len().div_ceil(workers);
    let joined: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = pids
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|&pid| (pid, source.query(pid)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    });

    let mut merged = Vec::with_capacity(pids.len());
    for part in joined {
        merged.extend(part.map_err(|_| CollectError::WorkerPanicked)?);
    }
    Ok(merged)
}
