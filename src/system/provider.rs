use std::sync::Arc;
use std::time::SystemTime;

use sysinfo::System;
use thiserror::Error;
use tracing::{debug_span, info, warn};

use super::backend::native::ProcessInfoSource;
use super::backend::{
    BackendKind, CollectError, GenericEnumerationBackend, MetricsBackend, NativeLibraryBackend,
};
use super::native_lib::{NativeLibrary, NativeLoadError};
use super::privilege::{OsPrivilegeElevator, PrivilegeElevator};
use super::rate::RateDeriver;
use super::snapshot::SystemSnapshot;
use crate::config::NativeConfig;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error(transparent)]
    Collect(#[from] CollectError),
}

/// Anything that can produce a fresh snapshot on demand.
pub trait Sampler: Send {
    fn sample(&mut self) -> Result<SystemSnapshot, SampleError>;
}

/// Owns the chosen backend and the rate state threaded through it.
///
/// The backend is picked once at construction: the native helper if it
/// loads and validates, otherwise the generic fallback for the rest of the
/// session.
pub struct MetricsProvider {
    backend: Box<dyn MetricsBackend>,
    kind: BackendKind,
    rates: RateDeriver,
    elevator: Arc<dyn PrivilegeElevator>,
    host: System,
    fallback_reason: Option<String>,
}

impl MetricsProvider {
    pub fn new(config: &NativeConfig) -> Self {
        let elevator: Arc<dyn PrivilegeElevator> = Arc::new(OsPrivilegeElevator::new());
        let enabled = config.enabled;
        let path = config.library_path.clone();
        let name = config.library_name.clone();
        Self::with_native_loader(elevator, config.probe_workers, move || {
            if !enabled {
                return Err(NativeLoadError::Disabled);
            }
            let lib = NativeLibrary::discover(path.as_deref(), &name)?;
            info!(path = %lib.path().display(), "native helper loaded");
            Ok(Box::new(lib) as Box<dyn ProcessInfoSource>)
        })
    }

    /// Elevate, attempt the native helper via `load`, and fall back to
    /// generic enumeration if it fails.
    pub fn with_native_loader<F>(elevator: Arc<dyn PrivilegeElevator>, workers: usize, load: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn ProcessInfoSource>, NativeLoadError>,
    {
        elevator.elevate();

        match load() {
            Ok(source) => {
                let backend = NativeLibraryBackend::new(source, workers);
                Self::from_backend(Box::new(backend), elevator)
            }
            Err(err) => {
                warn!(error = %err, "native helper unavailable; using generic enumeration");
                let mut provider =
                    Self::from_backend(Box::new(GenericEnumerationBackend::new()), elevator);
                provider.fallback_reason = Some(err.to_string());
                provider
            }
        }
    }

    /// Bind to an already-built backend.
    pub fn from_backend(backend: Box<dyn MetricsBackend>, elevator: Arc<dyn PrivilegeElevator>) -> Self {
        let kind = backend.kind();
        info!(backend = %kind, "metrics backend selected");
        let mut host = System::new();
        host.refresh_cpu_frequency();
        MetricsProvider {
            backend,
            kind,
            rates: RateDeriver::new(),
            elevator,
            host,
            fallback_reason: None,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// Why the native helper was not used, if it was not.
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Seconds since the UNIX epoch.
    pub fn boot_time(&self) -> u64 {
        System::boot_time()
    }

    /// MHz of the first logical CPU as of the last sample, 0 when unknown.
    pub fn cpu_frequency(&self) -> u64 {
        self.host.cpus().first().map(|cpu| cpu.frequency()).unwrap_or(0)
    }

    pub fn sample(&mut self) -> Result<SystemSnapshot, SampleError> {
        let _span = debug_span!("provider.sample", backend = %self.kind).entered();

        // Tokens can lose the privilege between calls; re-enabling is cheap.
        if self.kind == BackendKind::NativeLibrary {
            self.elevator.elevate();
        }

        let sample = self.backend.collect(&mut self.rates)?;
        self.host.refresh_cpu_frequency();

        Ok(SystemSnapshot {
            cpu_percent: sample.cpu_percent,
            memory: sample.memory,
            disk: sample.disk,
            network: sample.network,
            cpu_frequency: self.cpu_frequency(),
            boot_time: self.boot_time(),
            sampled_at: SystemTime::now(),
            backend: self.kind,
            processes: sample.processes,
        })
    }
}

impl Sampler for MetricsProvider {
    fn sample(&mut self) -> Result<SystemSnapshot, SampleError> {
        MetricsProvider::sample(self)
    }
}
