// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Forceful termination by executable name, independent of any child handle.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Number of processes signalled.
    Killed(usize),
    NoSuchProcess,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct KillError(pub String);

pub trait ProcessKiller: Send + Sync {
    fn kill_by_name(&self, name: &str) -> Result<KillOutcome, KillError>;
}

/// The platform's own kill-by-name mechanism.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemKiller;

impl ProcessKiller for SystemKiller {
    fn kill_by_name(&self, name: &str) -> Result<KillOutcome, KillError> {
        if name.is_empty() {
            return Err(KillError("empty process name".to_string()));
        }
        imp::kill_by_name(name)
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use super::{KillError, KillOutcome};
    use log::{debug, warn};
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use std::fs;
    use std::path::Path;

    /// `comm` is truncated to 15 bytes by the kernel.
    const COMM_LEN: usize = 15;

    pub fn kill_by_name(name: &str) -> Result<KillOutcome, KillError> {
        let own = std::process::id();
        let entries =
            fs::read_dir("/proc").map_err(|e| KillError(format!("reading /proc: {e}")))?;

        let mut killed = 0;
        let mut failures = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            if pid == own || !matches_name(&entry.path(), name) || is_zombie(&entry.path()) {
                continue;
            }
            match signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => {
                    debug!("sent SIGKILL to {name} (pid={pid})");
                    killed += 1;
                }
                Err(Errno::ESRCH) => {}
                Err(e) => {
                    warn!("failed to kill {name} (pid={pid}): {e}");
                    failures.push(format!("pid {pid}: {e}"));
                }
            }
        }

        if !failures.is_empty() {
            return Err(KillError(failures.join(", ")));
        }
        Ok(if killed == 0 {
            KillOutcome::NoSuchProcess
        } else {
            KillOutcome::Killed(killed)
        })
    }

    fn matches_name(proc_dir: &Path, name: &str) -> bool {
        if name.len() <= COMM_LEN
            && let Ok(comm) = fs::read_to_string(proc_dir.join("comm"))
            && comm.trim_end_matches('\n') == name
        {
            return true;
        }
        let Ok(cmdline) = fs::read(proc_dir.join("cmdline")) else {
            return false;
        };
        let argv0 = cmdline.split(|&b| b == 0).next().unwrap_or_default();
        Path::new(&*String::from_utf8_lossy(argv0))
            .file_name()
            .is_some_and(|f| f == name)
    }

    fn is_zombie(proc_dir: &Path) -> bool {
        fs::read_to_string(proc_dir.join("stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.trim_start().chars().next()
            })
            .is_some_and(|state| state == 'Z')
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
mod imp {
    use super::{KillError, KillOutcome};
    use std::process::Command;

    pub fn kill_by_name(name: &str) -> Result<KillOutcome, KillError> {
        let output = Command::new("pkill")
            .args(["-KILL", "-x", name])
            .output()
            .map_err(|e| KillError(format!("running pkill: {e}")))?;
        match output.status.code() {
            Some(0) => Ok(KillOutcome::Killed(1)),
            Some(1) => Ok(KillOutcome::NoSuchProcess),
            _ => Err(KillError(format!(
                "pkill {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::{KillError, KillOutcome};
    use std::process::Command;

    /// taskkill exit code when no process matched the image name.
    const NOT_FOUND: i32 = 128;

    pub fn kill_by_name(name: &str) -> Result<KillOutcome, KillError> {
        let output = Command::new("taskkill")
            .args(["/F", "/IM", name])
            .output()
            .map_err(|e| KillError(format!("running taskkill: {e}")))?;
        match output.status.code() {
            Some(0) => Ok(KillOutcome::Killed(1)),
            Some(NOT_FOUND) => Ok(KillOutcome::NoSuchProcess),
            _ => Err(KillError(format!(
                "taskkill {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    use super::{KillError, KillOutcome};

    pub fn kill_by_name(_name: &str) -> Result<KillOutcome, KillError> {
        Err(KillError("kill by name is not supported on this platform".to_string()))
    }
}
