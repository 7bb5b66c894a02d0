pub mod generic;
pub mod native;

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

use super::process::ProcessSnapshot;
use super::rate::RateDeriver;
use super::snapshot::{DiskRates, MemoryStats, NetworkRates};

pub use generic::GenericEnumerationBackend;
pub use native::NativeLibraryBackend;

/// Which counter source a provider is bound to for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    NativeLibrary,
    GenericFallback,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::NativeLibrary => "native",
            BackendKind::GenericFallback => "generic",
        })
    }
}

/// Failure to read one process. The process is left out of the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("process exited")]
    Gone,
    #[error("access denied")]
    AccessDenied,
    #[error("helper returned no name")]
    Unnamed,
    #[error("malformed record: {0}")]
    Malformed(&'static str),
}

/// Failure of a whole collection cycle.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("process enumeration failed: {0}")]
    Enumeration(#[from] io::Error),
    #[error("probe worker panicked")]
    WorkerPanicked,
}

/// Everything a backend measures in one cycle. The provider adds the host
/// facts and the timestamp.
#[derive(Clone, Debug, Default)]
pub struct BackendSample {
    pub cpu_percent: f32,
    pub memory: MemoryStats,
    pub disk: DiskRates,
    pub network: NetworkRates,
    pub processes: Vec<ProcessSnapshot>,
    /// Processes seen by enumeration but left out after a failed probe.
    pub omitted: usize,
}

pub trait MetricsBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Run one collection cycle. `rates` carries the previous cycle's
    /// counters and is updated in place.
    fn collect(&mut self, rates: &mut RateDeriver) -> Result<BackendSample, CollectError>;
}

/// Bytes per second to MB/s.
pub fn to_mb_per_sec(bytes_per_sec: f64) -> f64 {
    bytes_per_sec / (1024.0 * 1024.0)
}
