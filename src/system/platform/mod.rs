use std::io;

use super::cpu::CpuTimes;

/// Cumulative I/O byte counters. `other_bytes` is I/O that is neither a
/// storage read nor write (sockets, pipes, device control), when the OS
/// reports it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub other_bytes: Option<u64>,
}

pub trait PlatformExtensions {
    fn enumerate_pids() -> io::Result<Vec<u32>>;
    fn process_io(pid: u32) -> Option<IoStats>;
    fn cpu_times() -> Option<CpuTimes>;
    fn system_disk_io() -> Option<IoStats>;
    fn enable_debug_privilege() -> io::Result<()>;
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as platform_impl;
#[cfg(target_os = "macos")]
use macos as platform_impl;
#[cfg(target_os = "windows")]
use windows as platform_impl;

pub fn enumerate_pids() -> io::Result<Vec<u32>> {
    platform_impl::Platform::enumerate_pids()
}

pub fn process_io(pid: u32) -> Option<IoStats> {
    platform_impl::Platform::process_io(pid)
}

pub fn cpu_times() -> Option<CpuTimes> {
    platform_impl::Platform::cpu_times()
}

pub fn system_disk_io() -> Option<IoStats> {
    platform_impl::Platform::system_disk_io()
}

pub fn enable_debug_privilege() -> io::Result<()> {
    platform_impl::Platform::enable_debug_privilege()
}
