use std::io;

use libproc::libproc::pid_rusage::{RUsageInfoV2, pidrusage};
use libproc::processes::{ProcFilter, pids_by_type};

use super::{IoStats, PlatformExtensions};
use crate::system::cpu::CpuTimes;

pub struct Platform;

impl PlatformExtensions for Platform {
    fn enumerate_pids() -> io::Result<Vec<u32>> {
        pids_by_type(ProcFilter::All)
    }

    fn process_io(pid: u32) -> Option<IoStats> {
        let usage = pidrusage::<RUsageInfoV2>(pid as i32).ok()?;
        // No per-process split of non-storage I/O on macOS
        Some(IoStats {
            read_bytes: usage.ri_diskio_bytesread,
            write_bytes: usage.ri_diskio_byteswritten,
            other_bytes: None,
        })
    }

    fn cpu_times() -> Option<CpuTimes> {
        None
    }

    fn system_disk_io() -> Option<IoStats> {
        None
    }

    fn enable_debug_privilege() -> io::Result<()> {
        // SAFETY: geteuid takes no arguments and cannot fail.
        if unsafe { libc::geteuid() } == 0 {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "not running as root; task ports of other users are unavailable",
            ))
        }
    }
}
