//! PID file handling, including stale-lock detection.
//!
//! Grounded on `original_source/src/acl-helper.c`: if a pre-existing
//! pidfile names a PID that is still alive, refuse to start; if the PID is
//! dead, log and overwrite.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PidfileError {
    #[error("another instance is already running (pid {0})")]
    AlreadyRunning(i32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check for a live, distinct process named by an existing pidfile, then
/// write our own PID into it.
pub fn write(path: &Path) -> Result<(), PidfileError> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if let Ok(pid) = existing.trim().parse::<i32>() {
            if pid != std::process::id() as i32 && process_is_alive(pid) {
                return Err(PidfileError::AlreadyRunning(pid));
            }
            log::info!("removing stale pidfile for pid {pid}");
        }
    }
    std::fs::write(path, format!("{}\n", std::process::id()))?;
    Ok(())
}

pub fn remove(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        log::warn!("failed to remove pidfile '{}': {err}", path.display());
    }
}

fn process_is_alive(pid: i32) -> bool {
    // kill(pid, 0) performs no signal delivery, only existence/permission
    // checks.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_removes_pidfile() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path();
        std::fs::remove_file(path).ok();
        write(path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
        remove(path);
        assert!(!path.exists());
    }

    #[test]
    fn stale_pid_is_overwritten() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path();
        // PID 1 belongs to init and is never us; use an implausibly large
        // PID instead, which on Linux is guaranteed unused.
        std::fs::write(path, "2147483647\n").unwrap();
        write(path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }
}
