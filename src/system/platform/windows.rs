use std::io;

use super::{IoStats, PlatformExtensions};
use crate::system::cpu::CpuTimes;

pub struct Platform;

#[cfg(target_os = "windows")]
use windows_sys::Win32::{
    Foundation::{CloseHandle, ERROR_NOT_ALL_ASSIGNED, FILETIME, GetLastError, HANDLE, LUID},
    Security::{
        AdjustTokenPrivileges, LUID_AND_ATTRIBUTES, LookupPrivilegeValueW, SE_PRIVILEGE_ENABLED,
        TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
    },
    System::ProcessStatus::EnumProcesses,
    System::Threading::{
        GetCurrentProcess, GetProcessIoCounters, GetSystemTimes, IO_COUNTERS, OpenProcess,
        OpenProcessToken, PROCESS_QUERY_LIMITED_INFORMATION,
    },
};

#[cfg(target_os = "windows")]
fn filetime_ticks(ft: &FILETIME) -> u64 {
    ((ft.dwHighDateTime as u64) << 32) | ft.dwLowDateTime as u64
}

impl PlatformExtensions for Platform {
    #[cfg(target_os = "windows")]
    fn enumerate_pids() -> io::Result<Vec<u32>> {
        let mut capacity = 1024usize;
        loop {
            let mut pids = vec![0u32; capacity];
            let bytes = (capacity * std::mem::size_of::<u32>()) as u32;
            let mut needed = 0u32;
            // SAFETY: the buffer holds `bytes` bytes and `needed` is a valid out-pointer.
            let ok = unsafe { EnumProcesses(pids.as_mut_ptr(), bytes, &mut needed) };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            // A full buffer may have truncated the list; grow and retry.
            if needed < bytes {
                pids.truncate(needed as usize / std::mem::size_of::<u32>());
                return Ok(pids);
            }
            capacity *= 2;
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn enumerate_pids() -> io::Result<Vec<u32>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    #[cfg(target_os = "windows")]
    fn process_io(pid: u32) -> Option<IoStats> {
        // SAFETY: the handle is checked before use and closed on every path.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return None;
            }
            let mut counters = std::mem::zeroed::<IO_COUNTERS>();
            let ok = GetProcessIoCounters(handle, &mut counters);
            CloseHandle(handle);
            if ok == 0 {
                return None;
            }
            Some(IoStats {
                read_bytes: counters.ReadTransferCount,
                write_bytes: counters.WriteTransferCount,
                other_bytes: Some(counters.OtherTransferCount),
            })
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn process_io(_pid: u32) -> Option<IoStats> {
        None
    }

    #[cfg(target_os = "windows")]
    fn cpu_times() -> Option<CpuTimes> {
        // SAFETY: all three out-pointers reference live stack values.
        unsafe {
            let mut idle = std::mem::zeroed::<FILETIME>();
            let mut kernel = std::mem::zeroed::<FILETIME>();
            let mut user = std::mem::zeroed::<FILETIME>();
            if GetSystemTimes(&mut idle, &mut kernel, &mut user) == 0 {
                return None;
            }
            Some(CpuTimes {
                idle: filetime_ticks(&idle),
                kernel: filetime_ticks(&kernel),
                user: filetime_ticks(&user),
            })
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn cpu_times() -> Option<CpuTimes> {
        None
    }

    fn system_disk_io() -> Option<IoStats> {
        // Performance counters are not wired; callers sum per-process I/O.
        None
    }

    #[cfg(target_os = "windows")]
    fn enable_debug_privilege() -> io::Result<()> {
        let name: Vec<u16> = "SeDebugPrivilege\0".encode_utf16().collect();
        // SAFETY: every handle is checked and closed; `name` is NUL-terminated.
        unsafe {
            let mut token: HANDLE = std::ptr::null_mut();
            if OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut token,
            ) == 0
            {
                return Err(io::Error::last_os_error());
            }

            let mut luid = std::mem::zeroed::<LUID>();
            if LookupPrivilegeValueW(std::ptr::null(), name.as_ptr(), &mut luid) == 0 {
                let err = io::Error::last_os_error();
                CloseHandle(token);
                return Err(err);
            }

            let privileges = TOKEN_PRIVILEGES {
                PrivilegeCount: 1,
                Privileges: [LUID_AND_ATTRIBUTES {
                    Luid: luid,
                    Attributes: SE_PRIVILEGE_ENABLED,
                }],
            };
            let ok = AdjustTokenPrivileges(
                token,
                0,
                &privileges,
                std::mem::size_of::<TOKEN_PRIVILEGES>() as u32,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            // Succeeds without assigning anything when the token lacks the right.
            let last = GetLastError();
            CloseHandle(token);
            if ok == 0 || last == ERROR_NOT_ALL_ASSIGNED {
                return Err(io::Error::from_raw_os_error(last as i32));
            }
            Ok(())
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn enable_debug_privilege() -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}
