use std::io;
use std::path::Path;

use super::{IoStats, PlatformExtensions};
use crate::system::cpu::CpuTimes;

const SECTOR_SIZE: u64 = 512;

pub struct Platform;

impl PlatformExtensions for Platform {
    fn enumerate_pids() -> io::Result<Vec<u32>> {
        let mut pids = Vec::new();
        for entry in std::fs::read_dir("/proc")?.flatten() {
            if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                pids.push(pid);
            }
        }
        Ok(pids)
    }

    fn process_io(pid: u32) -> Option<IoStats> {
        // Read /proc/{pid}/io; needs same owner or CAP_SYS_PTRACE
        let path = format!("/proc/{pid}/io");
        let contents = std::fs::read_to_string(path).ok()?;
        parse_proc_io(&contents)
    }

    fn cpu_times() -> Option<CpuTimes> {
        let contents = std::fs::read_to_string("/proc/stat").ok()?;
        parse_proc_stat(&contents)
    }

    fn system_disk_io() -> Option<IoStats> {
        let contents = std::fs::read_to_string("/proc/diskstats").ok()?;
        Some(parse_diskstats(&contents, |name| {
            Path::new("/sys/block").join(name).exists()
        }))
    }

    fn enable_debug_privilege() -> io::Result<()> {
        // Capabilities cannot be acquired at runtime; only report whether we
        // already see every process.
        // SAFETY: geteuid takes no arguments and cannot fail.
        if unsafe { libc::geteuid() } == 0 {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "not running as root; processes of other users expose partial data",
            ))
        }
    }
}

fn parse_proc_io(contents: &str) -> Option<IoStats> {
    let mut rchar = None;
    let mut wchar = None;
    let mut read_bytes = None;
    let mut write_bytes = None;
    for line in contents.lines() {
        let Some((key, val)) = line.split_once(':') else {
            continue;
        };
        let val: Option<u64> = val.trim().parse().ok();
        match key {
            "rchar" => rchar = val,
            "wchar" => wchar = val,
            "read_bytes" => read_bytes = val,
            "write_bytes" => write_bytes = val,
            _ => {}
        }
    }
    let read_bytes = read_bytes?;
    let write_bytes = write_bytes?;
    // Character I/O that never reached storage: sockets, pipes, ttys.
    let other_bytes = match (rchar, wchar) {
        (Some(r), Some(w)) => {
            Some(r.saturating_sub(read_bytes) + w.saturating_sub(write_bytes))
        }
        _ => None,
    };
    Some(IoStats {
        read_bytes,
        write_bytes,
        other_bytes,
    })
}

fn parse_proc_stat(contents: &str) -> Option<CpuTimes> {
    let line = contents.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse().unwrap_or(0))
        .collect();
    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    // user nice system idle iowait irq softirq steal
    let idle = field(3) + field(4);
    let kernel = field(2) + field(5) + field(6) + field(7) + idle;
    let user = field(0) + field(1);
    Some(CpuTimes { idle, kernel, user })
}

fn parse_diskstats(contents: &str, is_whole_disk: impl Fn(&str) -> bool) -> IoStats {
    let mut stats = IoStats::default();
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // major minor name reads merged sectors_read ms writes merged sectors_written
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") || !is_whole_disk(name) {
            continue;
        }
        let sectors_read: u64 = fields[5].parse().unwrap_or(0);
        let sectors_written: u64 = fields[9].parse().unwrap_or(0);
        stats.read_bytes += sectors_read * SECTOR_SIZE;
        stats.write_bytes += sectors_written * SECTOR_SIZE;
    }
    stats
}
