use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use procpulse::system::platform;
use procpulse::system::terminate::{TerminateResult, terminate_process};

fn spawn_long_lived_child() -> Child {
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("powershell");
        c.args([
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            "Start-Sleep -Seconds 30",
        ]);
        c
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = Command::new("sh");
        c.args(["-c", "sleep 30"]);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn child process")
}

fn wait_for_pid(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if platform::enumerate_pids()
            .map(|pids| pids.contains(&pid))
            .unwrap_or(false)
        {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn enumeration_includes_current_process() {
    let pids = platform::enumerate_pids().expect("enumerate pids");
    assert!(pids.contains(&std::process::id()));
}

#[test]
fn terminate_nonexistent_pid_returns_not_found() {
    let result = terminate_process(u32::MAX);
    assert_eq!(result, TerminateResult::NotFound(u32::MAX));
}

#[test]
fn terminate_spawned_child() {
    let mut child = spawn_long_lived_child();
    let pid = child.id();

    if !wait_for_pid(pid, Duration::from_secs(3)) {
        let _ = child.kill();
        panic!("child process PID {pid} was not enumerated before terminate attempt");
    }

    match terminate_process(pid) {
        TerminateResult::Success(terminated) => {
            assert_eq!(terminated, pid);
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() < deadline => {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Ok(None) => {
                        let _ = child.kill();
                        panic!("child process did not exit before timeout");
                    }
                    Err(err) => {
                        let _ = child.kill();
                        panic!("failed waiting for child exit: {err}");
                    }
                }
            }
        }
        TerminateResult::Failed(_, err) => {
            let _ = child.kill();
            panic!("terminate_process reported failure: {err}");
        }
        TerminateResult::NotFound(_) => {
            let _ = child.kill();
            panic!("child process not found");
        }
    }
}
