// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::kill::{KillError, KillOutcome, ProcessKiller};
use crate::probe;
use crate::state::CoreState;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Exit code the core uses to report that it was told to stop.
pub const STOP_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("core is already running")]
    AlreadyRunning,
    #[error("core executable not found: {}", .0.display())]
    CoreMissing(PathBuf),
    #[error("config file not found: {}", .0.display())]
    ConfigMissing(PathBuf),
    #[error("failed to spawn {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StartError {
    pub fn status_message(&self) -> String {
        match self {
            StartError::AlreadyRunning => "sing-box is already running".to_string(),
            StartError::CoreMissing(_) => "sing-box core not found!".to_string(),
            StartError::ConfigMissing(_) => "sing-box config not found!".to_string(),
            StartError::Spawn { source, .. } => format!("Failed to start sing-box: {source}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("failed to stop {name}: {source}")]
    StopFailed {
        name: String,
        #[source]
        source: KillError,
    },
    #[error("kill task failed: {0}")]
    Join(String),
}

impl StopError {
    pub fn status_message(&self) -> String {
        "Failed to stop sing-box.".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Nothing by that name was running. Not an error.
    NotRunning,
}

impl StopOutcome {
    pub fn status_message(self) -> &'static str {
        match self {
            StopOutcome::Stopped => "sing-box stopped successfully!",
            StopOutcome::NotRunning => "sing-box is not running!",
        }
    }
}

/// Sent by the wait task when a spawned core exits.
/// Both `code` and `signal` are `None` when the wait itself failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreExit {
    pub generation: u64,
    pub pid: u32,
    pub code: Option<i32>,
    /// Terminating signal on unix.
    pub signal: Option<i32>,
}

impl CoreExit {
    fn outcome(&self) -> ExitOutcome {
        match (self.code, self.signal) {
            (Some(STOP_EXIT_CODE), _) => ExitOutcome::Stopped,
            (Some(code), _) => ExitOutcome::Failed { code },
            (None, Some(signal)) if is_forced_kill(signal) => ExitOutcome::Stopped,
            (None, Some(signal)) => ExitOutcome::Signaled { signal },
            (None, None) => ExitOutcome::Lost,
        }
    }
}

/// SIGKILL is what a kill by name from outside delivers.
#[cfg(unix)]
fn is_forced_kill(signal: i32) -> bool {
    signal == nix::sys::signal::Signal::SIGKILL as i32
}

#[cfg(not(unix))]
fn is_forced_kill(_signal: i32) -> bool {
    false
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Stop code, or SIGKILL.
    Stopped,
    Failed { code: i32 },
    /// Any other terminating signal, e.g. a crash.
    Signaled { signal: i32 },
    /// The exit status could not be collected.
    Lost,
}

impl ExitOutcome {
    pub fn status_message(self) -> String {
        match self {
            ExitOutcome::Stopped => "sing-box stopped".to_string(),
            ExitOutcome::Failed { code } => format!("sing-box exited with code {code}"),
            ExitOutcome::Signaled { signal } => {
                format!("sing-box terminated by signal {signal}")
            }
            ExitOutcome::Lost => "sing-box exited with unknown status".to_string(),
        }
    }
}

/// Where the core's stdout/stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreOutput {
    Inherit,
    Null,
}

impl CoreOutput {
    pub fn from_setting(s: &str) -> Self {
        match s {
            "inherit" => CoreOutput::Inherit,
            _ => CoreOutput::Null,
        }
    }

    fn stdio(self) -> Stdio {
        match self {
            CoreOutput::Inherit => Stdio::inherit(),
            CoreOutput::Null => Stdio::null(),
        }
    }
}

/// What the supervisor knows about the current core launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreProcessHandle {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub pid: u32,
}

/// Owns the lifecycle of the single core process.
///
/// Only the owner mutates state. The exit of a spawned core is awaited on a
/// separate task and delivered as a [`CoreExit`] on the receiver returned by
/// [`CoreSupervisor::new`]; feed it back through [`CoreSupervisor::handle_exit`].
pub struct CoreSupervisor {
    config_path: PathBuf,
    output: CoreOutput,
    killer: Arc<dyn ProcessKiller>,
    state: CoreState,
    handle: Option<CoreProcessHandle>,
    generation: u64,
    exit_tx: mpsc::UnboundedSender<CoreExit>,
}

impl CoreSupervisor {
    pub fn new(
        config_path: PathBuf,
        output: CoreOutput,
        killer: Arc<dyn ProcessKiller>,
    ) -> (Self, mpsc::UnboundedReceiver<CoreExit>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        (
            Self {
                config_path,
                output,
                killer,
                state: CoreState::NotStarted,
                handle: None,
                generation: 0,
                exit_tx,
            },
            exit_rx,
        )
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    pub fn handle(&self) -> Option<&CoreProcessHandle> {
        self.handle.as_ref()
    }

    fn transition(&mut self, next: CoreState) {
        if !self.state.can_transition_to(next) {
            warn!("unexpected core state transition {} -> {next}", self.state);
        }
        self.state = next;
    }

    /// Spawn `executable args...` from the executable's own directory.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, executable: &Path, args: &[&str]) -> Result<u32, StartError> {
        if self.state.is_alive() {
            info!("start requested but core is already running");
            return Err(StartError::AlreadyRunning);
        }
        if !probe::exists(executable) {
            error!("sing-box core not found: {}", executable.display());
            return Err(StartError::CoreMissing(executable.to_path_buf()));
        }
        if !probe::exists(&self.config_path) {
            error!("sing-box config not found: {}", self.config_path.display());
            return Err(StartError::ConfigMissing(self.config_path.clone()));
        }

        // Relative program paths would be resolved against the new working dir.
        let executable = std::path::absolute(executable).unwrap_or_else(|_| executable.into());
        let working_dir = executable
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        info!(
            "starting sing-box with command: {} {}",
            executable.display(),
            args.join(" ")
        );

        let mut cmd = Command::new(&executable);
        cmd.args(args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(self.output.stdio())
            .stderr(self.output.stdio());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                error!("failed to spawn {}: {source}", executable.display());
                self.transition(CoreState::Failed);
                return Err(StartError::Spawn {
                    path: executable,
                    source,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        self.generation += 1;
        let generation = self.generation;
        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            let (code, signal) = match child.wait().await {
                Ok(status) => {
                    info!("sing-box (pid={pid}) exited with {status}");
                    (status.code(), exit_signal(&status))
                }
                Err(e) => {
                    error!("error waiting for sing-box (pid={pid}): {e}");
                    (None, None)
                }
            };
            let _ = exit_tx.send(CoreExit {
                generation,
                pid,
                code,
                signal,
            });
        });

        info!("sing-box started (pid={pid})");
        self.handle = Some(CoreProcessHandle {
            executable,
            working_dir,
            pid,
        });
        self.transition(CoreState::Running);
        Ok(pid)
    }

    /// Record the exit of a core spawned by this supervisor.
    /// Returns `None` for exits that no longer concern the current state:
    /// an earlier launch, or a core we already stopped by name.
    pub fn handle_exit(&mut self, exit: CoreExit) -> Option<ExitOutcome> {
        if exit.generation != self.generation {
            info!("ignoring exit of earlier sing-box launch (pid={})", exit.pid);
            return None;
        }
        self.handle = None;
        if self.state != CoreState::Running {
            info!("sing-box (pid={}) exited after stop", exit.pid);
            return None;
        }
        let outcome = exit.outcome();
        match outcome {
            ExitOutcome::Stopped => {
                info!("sing-box stopped (pid={})", exit.pid);
                self.transition(CoreState::Stopped);
            }
            ExitOutcome::Failed { code } => {
                error!("sing-box failed with exit code {code} (pid={})", exit.pid);
                self.transition(CoreState::Failed);
            }
            ExitOutcome::Signaled { signal } => {
                error!("sing-box terminated by signal {signal} (pid={})", exit.pid);
                self.transition(CoreState::Failed);
            }
            ExitOutcome::Lost => {
                error!("sing-box exit status unavailable (pid={})", exit.pid);
                self.transition(CoreState::Failed);
            }
        }
        Some(outcome)
    }

    /// Forcefully kill every process named `process_name`.
    pub async fn stop(&mut self, process_name: &str) -> Result<StopOutcome, StopError> {
        info!("stopping sing-box by name: {process_name}");
        let previous = self.state;
        self.transition(CoreState::Stopping);

        let killer = Arc::clone(&self.killer);
        let name = process_name.to_string();
        let result = tokio::task::spawn_blocking(move || killer.kill_by_name(&name)).await;

        let outcome = match result {
            Ok(Ok(KillOutcome::Killed(n))) => {
                info!("sing-box stopped successfully ({n} process(es) killed)");
                self.transition(CoreState::Stopped);
                StopOutcome::Stopped
            }
            Ok(Ok(KillOutcome::NoSuchProcess)) => {
                info!("sing-box is not running");
                let next = if previous.is_alive() {
                    CoreState::Stopped
                } else {
                    previous
                };
                self.transition(next);
                StopOutcome::NotRunning
            }
            Ok(Err(source)) => {
                error!("failed to stop sing-box: {source}");
                self.transition(previous);
                return Err(StopError::StopFailed {
                    name: process_name.to_string(),
                    source,
                });
            }
            Err(e) => {
                error!("kill task for sing-box failed: {e}");
                self.transition(previous);
                return Err(StopError::Join(e.to_string()));
            }
        };
        Ok(outcome)
    }
}
