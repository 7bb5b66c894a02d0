//! Binding to the native process-info helper library.
//!
//! The helper exports one function, `GetProcessInfo(pid) -> ProcessInfo`, that
//! returns a fixed-layout record. It keeps its own per-process deltas, so the
//! rates it reports are already per second.

use std::ffi::OsString;
use std::mem::{offset_of, size_of};
use std::path::{Path, PathBuf};

use libloading::Library;
use thiserror::Error;
use tracing::debug;

use super::backend::ProbeError;
use super::backend::native::{NativeProcessRecord, ProcessInfoSource};

/// Width of the helper's name buffer, in wide characters.
pub const NAME_CAPACITY: usize = 260;

const ENTRY_POINT: &[u8] = b"GetProcessInfo\0";

#[cfg(windows)]
pub type WideChar = u16;
#[cfg(not(windows))]
pub type WideChar = u32;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawProcessInfo {
    pub process_name: [WideChar; NAME_CAPACITY],
    pub cpu_usage: f64,
    pub memory_usage: usize,
    pub disk_read_rate: f64,
    pub disk_write_rate: f64,
    pub network_sent: f64,
    pub network_received: f64,
}

// Field order is the contract; any reordering is a build failure.
const _: () = {
    assert!(offset_of!(RawProcessInfo, cpu_usage) >= NAME_CAPACITY * size_of::<WideChar>());
    assert!(offset_of!(RawProcessInfo, memory_usage) > offset_of!(RawProcessInfo, cpu_usage));
    assert!(offset_of!(RawProcessInfo, disk_read_rate) > offset_of!(RawProcessInfo, memory_usage));
    assert!(offset_of!(RawProcessInfo, disk_write_rate) > offset_of!(RawProcessInfo, disk_read_rate));
    assert!(offset_of!(RawProcessInfo, network_sent) > offset_of!(RawProcessInfo, disk_write_rate));
    assert!(offset_of!(RawProcessInfo, network_received) > offset_of!(RawProcessInfo, network_sent));
    assert!(size_of::<RawProcessInfo>() >= offset_of!(RawProcessInfo, network_received) + 8);
};

pub type GetProcessInfoFn = unsafe extern "system" fn(u32) -> RawProcessInfo;

impl RawProcessInfo {
    pub fn zeroed() -> Self {
        Self {
            process_name: [0; NAME_CAPACITY],
            cpu_usage: 0.0,
            memory_usage: 0,
            disk_read_rate: 0.0,
            disk_write_rate: 0.0,
            network_sent: 0.0,
            network_received: 0.0,
        }
    }

    pub fn with_name(name: &str) -> Self {
        let mut raw = Self::zeroed();
        let units = encode_wide(name);
        let len = units.len().min(NAME_CAPACITY - 1);
        raw.process_name[..len].copy_from_slice(&units[..len]);
        raw
    }

    /// Check the record against the ABI contract and convert it.
    pub fn decode(&self) -> Result<NativeProcessRecord, ProbeError> {
        let end = self
            .process_name
            .iter()
            .position(|&c| c == 0)
            .ok_or(ProbeError::Malformed("name is not NUL-terminated"))?;
        let name = decode_wide(&self.process_name[..end]);

        let rates = [
            self.cpu_usage,
            self.disk_read_rate,
            self.disk_write_rate,
            self.network_sent,
            self.network_received,
        ];
        if rates.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ProbeError::Malformed("negative or non-finite figure"));
        }

        Ok(NativeProcessRecord {
            name,
            cpu_percent: self.cpu_usage,
            memory_bytes: self.memory_usage as u64,
            disk_read_rate: self.disk_read_rate,
            disk_write_rate: self.disk_write_rate,
            net_sent_rate: self.network_sent,
            net_recv_rate: self.network_received,
        })
    }
}

#[cfg(windows)]
fn encode_wide(s: &str) -> Vec<WideChar> {
    s.encode_utf16().collect()
}

#[cfg(not(windows))]
fn encode_wide(s: &str) -> Vec<WideChar> {
    s.chars().map(|c| c as u32).collect()
}

#[cfg(windows)]
fn decode_wide(units: &[WideChar]) -> String {
    String::from_utf16_lossy(units)
}

#[cfg(not(windows))]
fn decode_wide(units: &[WideChar]) -> String {
    units
        .iter()
        .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[derive(Debug, Error)]
pub enum NativeLoadError {
    #[error("native helper disabled by configuration")]
    Disabled,
    #[error("native helper `{name}` not found (searched {searched:?})")]
    NotFound { name: String, searched: Vec<PathBuf> },
    #[error("failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("{} does not export GetProcessInfo: {source}", path.display())]
    MissingSymbol {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("{} returned a record that does not match the expected layout: {source}", path.display())]
    LayoutMismatch {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },
}

/// A loaded, layout-validated helper library.
pub struct NativeLibrary {
    path: PathBuf,
    get_process_info: GetProcessInfoFn,
    // Keeps `get_process_info` valid.
    _library: Library,
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl NativeLibrary {
    /// Try every candidate location and keep the first library that loads
    /// and passes validation.
    pub fn discover(explicit: Option<&Path>, name: &str) -> Result<Self, NativeLoadError> {
        let candidates = candidate_paths(explicit, name);
        let mut last_error = None;

        for path in &candidates {
            // Bare file names go through the loader's own search path.
            if path.components().count() > 1 && !path.exists() {
                debug!(path = %path.display(), "native helper candidate missing");
                continue;
            }
            debug!(path = %path.display(), "trying native helper candidate");
            match Self::load(path) {
                Ok(lib) => return Ok(lib),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "native helper candidate rejected");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| NativeLoadError::NotFound {
            name: name.to_string(),
            searched: candidates,
        }))
    }

    pub fn load(path: &Path) -> Result<Self, NativeLoadError> {
        // SAFETY: loading runs the library's initializers; the helper is a
        // trusted component shipped alongside the binary.
        let library = unsafe { Library::new(path) }.map_err(|source| NativeLoadError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: the symbol type matches the helper's exported prototype; the
        // pointer stays valid while `library` is held by the returned value.
        let get_process_info = unsafe {
            let symbol = library
                .get::<GetProcessInfoFn>(ENTRY_POINT)
                .map_err(|source| NativeLoadError::MissingSymbol {
                    path: path.to_path_buf(),
                    source,
                })?;
            *symbol
        };

        let lib = Self {
            path: path.to_path_buf(),
            get_process_info,
            _library: library,
        };
        lib.validate()?;
        Ok(lib)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate(&self) -> Result<(), NativeLoadError> {
        let raw = self.call(std::process::id());
        raw.decode()
            .map(|_| ())
            .map_err(|source| NativeLoadError::LayoutMismatch {
                path: self.path.clone(),
                source,
            })
    }

    fn call(&self, pid: u32) -> RawProcessInfo {
        // SAFETY: validated entry point; the helper accepts any pid and
        // returns an empty record for ones it cannot open.
        unsafe { (self.get_process_info)(pid) }
    }
}

impl ProcessInfoSource for NativeLibrary {
    fn query(&self, pid: u32) -> Result<NativeProcessRecord, ProbeError> {
        self.call(pid).decode()
    }
}

pub fn candidate_paths(explicit: Option<&Path>, name: &str) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let file_name: OsString = libloading::library_filename(name);
    let mut paths = Vec::new();

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(&file_name));
    }
    if let Ok(dir) = std::env::current_dir() {
        paths.push(dir.join(&file_name));
    }
    paths.push(system_library_dir().join(&file_name));
    paths.dedup();
    paths
}

#[cfg(windows)]
fn system_library_dir() -> PathBuf {
    let windir = std::env::var_os("WINDIR").unwrap_or_else(|| OsString::from("C:\\Windows"));
    PathBuf::from(windir).join("System32")
}

#[cfg(not(windows))]
fn system_library_dir() -> PathBuf {
    PathBuf::new()
}
