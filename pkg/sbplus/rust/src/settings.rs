// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::probe;
use log::{LevelFilter, debug};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const SETTINGS_FILE: &str = "sing-box-plus.yaml";
pub const WORK_DIR_ENV: &str = "SBP_WORK_DIR";

#[cfg(windows)]
const DEFAULT_CORE_FILE: &str = "sing-box-core.exe";
#[cfg(not(windows))]
const DEFAULT_CORE_FILE: &str = "sing-box-core";

const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_LOG_FILE: &str = "logs.log";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown log level '{0}'")]
    InvalidLevel(String),
    #[error("cannot determine working directory: {0}")]
    WorkDir(#[source] std::io::Error),
}

/// Optional overrides read from `sing-box-plus.yaml` in the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub core_file: String,
    pub config_file: String,
    pub log_file: String,
    pub log_level: String,
    pub log_max_size: u64,
    pub fetch_timeout_secs: u64,
    /// `inherit` or `null`.
    pub core_output: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            core_file: DEFAULT_CORE_FILE.to_string(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
            log_level: "info".to_string(),
            log_max_size: sbplus_log::DEFAULT_MAX_SIZE,
            fetch_timeout_secs: 10,
            core_output: "null".to_string(),
        }
    }
}

impl Settings {
    /// Load `sing-box-plus.yaml` from `work_dir`, or defaults when it is absent.
    pub fn load(work_dir: &Path) -> Result<Self, SettingsError> {
        let path = work_dir.join(SETTINGS_FILE);
        if !probe::exists(&path) {
            debug!("no {} in {}, using defaults", SETTINGS_FILE, work_dir.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| SettingsError::Parse { path, source })
    }

    pub fn level_filter(&self) -> Result<LevelFilter, SettingsError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| SettingsError::InvalidLevel(self.log_level.clone()))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// `explicit`, then `$SBP_WORK_DIR`, then the process working directory.
pub fn resolve_work_dir(explicit: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    match std::env::var_os(WORK_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => std::env::current_dir().map_err(SettingsError::WorkDir),
    }
}

/// Well-known file locations, all relative to one working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub work_dir: PathBuf,
    pub core: PathBuf,
    pub config: PathBuf,
    pub log: PathBuf,
}

impl Paths {
    pub fn new(work_dir: &Path, settings: &Settings) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            core: work_dir.join(&settings.core_file),
            config: work_dir.join(&settings.config_file),
            log: work_dir.join(&settings.log_file),
        }
    }

    /// File name the core runs under; used to kill it by name.
    pub fn core_process_name(&self) -> String {
        self.core
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn core_exists(&self) -> bool {
        probe::exists(&self.core)
    }

    pub fn config_exists(&self) -> bool {
        probe::exists(&self.config)
    }
}
