//! Signal plumbing: SIGHUP re-execs the process in place, SIGINT/SIGTERM/
//! SIGQUIT run the exit hook (remove PID file, log) and exit with the
//! signal number.
//!
//! `ctrlc` (the teacher's dependency, see `router-core/src/system/signal.rs`)
//! can only register SIGINT; `signal_hook` (already used elsewhere in the
//! pack, e.g. `pks-os-neon`) is the multi-signal replacement this helper
//! needs for SIGHUP support.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::respawn;

/// Spawns a background thread that watches for the signals this helper
/// cares about. Returns a flag the request loop can poll to notice a
/// pending hang-up-triggered re-exec was requested (the re-exec itself
/// happens on the signal thread, since a successful `execve` replaces the
/// whole process image regardless of which thread calls it).
pub fn install(pidfile: Option<PathBuf>, exe_path: Option<PathBuf>) -> anyhow::Result<Arc<AtomicBool>> {
    let shutting_down = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM, SIGQUIT])?;
    let flag = shutting_down.clone();

    std::thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGHUP => match &exe_path {
                    Some(path) => {
                        log::info!("SIGHUP received, re-executing");
                        let err = respawn::reexec(path);
                        log::error!("re-exec failed: {err}");
                    }
                    None => {
                        log::warn!("SIGHUP received but no executable path was discovered; ignoring");
                    }
                },
                SIGINT | SIGTERM | SIGQUIT => {
                    log::info!("signal {signal} received, shutting down");
                    if let Some(path) = &pidfile {
                        crate::pidfile::remove(path);
                    }
                    flag.store(true, Ordering::SeqCst);
                    std::process::exit(signal);
                }
                _ => {}
            }
        }
    });

    Ok(shutting_down)
}
