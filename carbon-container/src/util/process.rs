//! Process signalling helpers.
//!
//! Distributions are launched in their own process group so that a start
//! script and every JVM it forks can be signalled together.

/// Send SIGTERM to the process group led by `pid`.
///
/// # Returns
/// * `true` - Signal delivered or the group no longer exists
/// * `false` - Failed to signal (permission denied)
pub fn terminate_process_group(pid: u32) -> bool {
    signal_group(pid, libc::SIGTERM)
}

/// Send SIGKILL to the process group led by `pid`.
pub fn kill_process_group(pid: u32) -> bool {
    signal_group(pid, libc::SIGKILL)
}

fn signal_group(pid: u32, signal: libc::c_int) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    unsafe { libc::kill(-(pid as i32), signal) == 0 || !is_process_alive(pid) }
}

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_current() {
        let current_pid = std::process::id();
        assert!(is_process_alive(current_pid));
    }

    #[test]
    fn test_is_process_alive_invalid() {
        // Very high PIDs are unlikely to exist; u32::MAX would turn into -1.
        assert!(!is_process_alive(999999999));
        assert!(!is_process_alive(u32::MAX));
        assert!(!is_process_alive(0));
    }

    #[test]
    fn test_signal_group_rejects_invalid_pid() {
        assert!(!terminate_process_group(0));
        assert!(!kill_process_group(u32::MAX));
    }

    #[test]
    fn test_kill_spawned_group() {
        use std::os::unix::process::CommandExt;

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id();
        assert!(kill_process_group(pid));
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
