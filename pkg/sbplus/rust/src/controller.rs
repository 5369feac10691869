// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Bootstrap decisions and the single owner of all mutable session state.

use crate::fetch::{ConfigFetcher, FetchError, validate_url};
use crate::kill::ProcessKiller;
use crate::process::{
    CoreExit, CoreOutput, CoreSupervisor, StartError, StopError, StopOutcome,
};
use crate::settings::Paths;
use crate::state::CoreState;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub const ADMIN_REQUIRED: &str = "You must run this program as administrator!";
pub const CONFIG_REQUIRED: &str = "Please set your subscription link, and download it.";

/// Arguments the core is always launched with.
pub const CORE_ARGS: &[&str] = &["run"];

/// Which actions the presentation layer may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub config_entry: bool,
    pub start: bool,
    pub stop: bool,
    /// Standing problem to show instead of a transient status.
    pub advisory: Option<&'static str>,
}

impl Affordances {
    pub fn can_start_stop(&self) -> bool {
        self.start || self.stop
    }
}

/// Derive the permitted actions from the three independent inputs.
/// Privilege is reported ahead of a missing config.
pub fn affordances(elevated: bool, config_exists: bool, core: CoreState) -> Affordances {
    let can_show_config_entry = !config_exists && elevated;
    let can_start_stop = config_exists && elevated;
    let advisory = if !elevated {
        Some(ADMIN_REQUIRED)
    } else if !config_exists {
        Some(CONFIG_REQUIRED)
    } else {
        None
    };
    Affordances {
        config_entry: can_show_config_entry,
        start: can_start_stop && core.can_start(),
        stop: can_start_stop,
        advisory,
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("administrator rights are required")]
    NotElevated,
    #[error("config file is missing")]
    ConfigMissing,
    #[error("a config download is already in progress")]
    FetchInFlight,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Start(#[from] StartError),
    #[error(transparent)]
    Stop(#[from] StopError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFinished {
    pub url: String,
    pub result: Result<usize, FetchError>,
}

/// Completion reported by background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    FetchFinished(FetchFinished),
    CoreExited(CoreExit),
}

pub struct Controller {
    paths: Paths,
    elevated: bool,
    supervisor: CoreSupervisor,
    exit_rx: mpsc::UnboundedReceiver<CoreExit>,
    fetcher: Arc<ConfigFetcher>,
    fetch_tx: mpsc::UnboundedSender<FetchFinished>,
    fetch_rx: mpsc::UnboundedReceiver<FetchFinished>,
    fetch_in_flight: bool,
    status: String,
}

impl Controller {
    /// `elevated` is sampled once by the caller and fixed for the session.
    pub fn new(
        paths: Paths,
        elevated: bool,
        fetcher: ConfigFetcher,
        output: CoreOutput,
        killer: Arc<dyn ProcessKiller>,
    ) -> Self {
        let (supervisor, exit_rx) = CoreSupervisor::new(paths.config.clone(), output, killer);
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let mut controller = Self {
            paths,
            elevated,
            supervisor,
            exit_rx,
            fetcher: Arc::new(fetcher),
            fetch_tx,
            fetch_rx,
            fetch_in_flight: false,
            status: format!("sing-box Plus v{}", crate::VERSION),
        };
        let now = controller.affordances();
        if let Some(advisory) = now.advisory {
            if elevated {
                info!("config file not found");
            } else {
                error!("{ADMIN_REQUIRED}");
            }
            controller.status = advisory.to_string();
        }
        controller
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn core_state(&self) -> CoreState {
        self.supervisor.state()
    }

    pub fn fetch_in_flight(&self) -> bool {
        self.fetch_in_flight
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Recomputed from disk and process state on every call.
    pub fn affordances(&self) -> Affordances {
        affordances(
            self.elevated,
            self.paths.config_exists(),
            self.supervisor.state(),
        )
    }

    fn set_status(&mut self, text: impl Into<String>) {
        self.status = text.into();
    }

    fn require_elevated(&mut self) -> Result<(), ControlError> {
        if self.elevated {
            return Ok(());
        }
        error!("{ADMIN_REQUIRED}");
        self.set_status(ADMIN_REQUIRED);
        Err(ControlError::NotElevated)
    }

    /// Validate `url` and download it in the background. The result arrives
    /// as [`Event::FetchFinished`].
    pub fn request_fetch(&mut self, url: &str) -> Result<(), ControlError> {
        info!("downloading config file...");
        self.require_elevated()?;
        if self.fetch_in_flight {
            info!("config download already in progress");
            self.set_status("Config download already in progress");
            return Err(ControlError::FetchInFlight);
        }
        if let Err(e) = validate_url(url) {
            error!("invalid url: {url}");
            self.set_status(e.status_message());
            return Err(e.into());
        }

        self.fetch_in_flight = true;
        self.set_status("Downloading config file\nPlease wait...");

        let fetcher = Arc::clone(&self.fetcher);
        let dest = self.paths.config.clone();
        let tx = self.fetch_tx.clone();
        let url = url.trim().to_string();
        tokio::spawn(async move {
            let result = fetcher.fetch_and_save(&url, &dest).await;
            let _ = tx.send(FetchFinished { url, result });
        });
        Ok(())
    }

    pub fn start(&mut self) -> Result<u32, ControlError> {
        info!("starting sing-box...");
        self.require_elevated()?;
        let core = self.paths.core.clone();
        match self.supervisor.start(&core, CORE_ARGS) {
            Ok(pid) => {
                self.set_status("sing-box is running...");
                Ok(pid)
            }
            Err(e) => {
                self.set_status(e.status_message());
                Err(e.into())
            }
        }
    }

    pub async fn stop(&mut self) -> Result<StopOutcome, ControlError> {
        info!("stopping sing-box...");
        self.require_elevated()?;
        if !self.paths.config_exists() {
            warn!("stop requested without a config file");
            self.set_status(CONFIG_REQUIRED);
            return Err(ControlError::ConfigMissing);
        }
        let name = self.paths.core_process_name();
        match self.supervisor.stop(&name).await {
            Ok(outcome) => {
                self.set_status(outcome.status_message());
                Ok(outcome)
            }
            Err(e) => {
                self.set_status(e.status_message());
                Err(e.into())
            }
        }
    }

    /// Wait for the next background completion.
    pub async fn next_event(&mut self) -> Option<Event> {
        tokio::select! {
            Some(exit) = self.exit_rx.recv() => Some(Event::CoreExited(exit)),
            Some(done) = self.fetch_rx.recv() => Some(Event::FetchFinished(done)),
            else => None,
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::FetchFinished(done) => self.finish_fetch(done),
            Event::CoreExited(exit) => {
                if let Some(outcome) = self.supervisor.handle_exit(exit) {
                    self.set_status(outcome.status_message());
                }
            }
        }
    }

    fn finish_fetch(&mut self, done: FetchFinished) {
        self.fetch_in_flight = false;
        match done.result {
            Ok(bytes) => {
                info!("config file saved ({bytes} bytes from {})", done.url);
                self.set_status("Config file saved");
            }
            Err(e) => {
                error!("failed to download config file: {e}");
                self.set_status(e.status_message());
            }
        }
    }
}
