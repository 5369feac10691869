// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreState {
    /// Never started this session.
    #[default]
    NotStarted,
    /// Child process is alive.
    Running,
    /// Kill-by-name in progress.
    Stopping,
    /// Killed, or exited with the stop code.
    Stopped,
    /// Spawn failed or the core exited with any other code.
    Failed,
}

impl CoreState {
    pub fn is_alive(self) -> bool {
        self == CoreState::Running
    }

    pub fn can_start(self) -> bool {
        !matches!(self, CoreState::Running | CoreState::Stopping)
    }

    pub(crate) fn can_transition_to(self, next: CoreState) -> bool {
        use CoreState::*;
        matches!(
            (self, next),
            (NotStarted | Stopped | Failed, Running)
                | (NotStarted | Stopped | Failed, Failed)
                | (Running, Stopped)
                | (Running, Failed)
                | (NotStarted | Running | Stopped | Failed, Stopping)
                | (Stopping, NotStarted | Running | Stopped | Failed)
        )
    }
}

impl fmt::Display for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreState::NotStarted => write!(f, "not started"),
            CoreState::Running => write!(f, "running"),
            CoreState::Stopping => write!(f, "stopping"),
            CoreState::Stopped => write!(f, "stopped"),
            CoreState::Failed => write!(f, "failed"),
        }
    }
}
