//! Process-wide registry of spawned agent children.
//!
//! Supervisors kill their own children on stop, but a host that is exiting
//! abruptly (panic hook, signal handler) can call [`kill_all`] to make sure
//! no agent outlives it.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RegisteredProcess {
    pub pid: u32,
    pub program: String,
}

static RUNNING: Lazy<Mutex<HashMap<u32, RegisteredProcess>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn register(pid: u32, program: impl Into<String>) {
    let mut guard = RUNNING.lock().unwrap_or_else(|e| e.into_inner());
    guard.insert(
        pid,
        RegisteredProcess {
            pid,
            program: program.into(),
        },
    );
}

pub fn unregister(pid: u32) {
    let mut guard = RUNNING.lock().unwrap_or_else(|e| e.into_inner());
    guard.remove(&pid);
}

pub fn is_registered(pid: u32) -> bool {
    let guard = RUNNING.lock().unwrap_or_else(|e| e.into_inner());
    guard.contains_key(&pid)
}

/// Every child currently alive
pub fn running() -> Vec<RegisteredProcess> {
    let guard = RUNNING.lock().unwrap_or_else(|e| e.into_inner());
    guard.values().cloned().collect()
}

/// Send SIGTERM to one pid. Returns whether the signal was delivered.
pub(crate) fn terminate(pid: u32) -> bool {
    #[cfg(unix)]
    {
        signal(pid, libc::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Send SIGKILL to every registered child. Returns how many were signalled.
pub fn kill_all() -> usize {
    let procs: Vec<RegisteredProcess> = {
        let mut guard = RUNNING.lock().unwrap_or_else(|e| e.into_inner());
        guard.drain().map(|(_, p)| p).collect()
    };

    let mut killed = 0;
    for proc in procs {
        #[cfg(unix)]
        {
            if signal(proc.pid, libc::SIGKILL) {
                killed += 1;
            }
        }

        #[cfg(not(unix))]
        {
            let _ = proc;
        }
    }

    if killed > 0 {
        tracing::warn!(killed, "killed leftover agent processes");
    }
    killed
}

#[cfg(unix)]
fn signal(pid: u32, sig: libc::c_int) -> bool {
    // 0 and negative pids address process groups
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    let rc = unsafe { libc::kill(pid, sig) };
    rc == 0
}
