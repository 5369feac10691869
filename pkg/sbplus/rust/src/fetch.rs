// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Subscription download: one GET, no proxy, atomic overwrite of the config file.

use crate::probe;
use log::{debug, info};
use reqwest::{StatusCode, Url};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid url: '{0}'")]
    InvalidUrl(String),
    #[error("unexpected HTTP status {0}")]
    BadStatus(u16),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("writing config failed: {0}")]
    WriteFailed(String),
}

impl FetchError {
    /// Short text for the status surface.
    pub fn status_message(&self) -> String {
        match self {
            FetchError::InvalidUrl(_) => "Invalid url!".to_string(),
            FetchError::BadStatus(code) => {
                format!("Failed to download config file!\nStatus code: {code}")
            }
            FetchError::Timeout => "Failed to download config file!\ntime out error".to_string(),
            FetchError::Network(_) => {
                "Failed to download config file!\nCheck your internet connection".to_string()
            }
            FetchError::WriteFailed(_) => "Failed to save config file!".to_string(),
        }
    }
}

/// Accept only absolute `http`/`https` URLs with a host.
pub fn validate_url(raw: &str) -> Result<Url, FetchError> {
    let invalid = || FetchError::InvalidUrl(raw.to_string());
    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    Ok(url)
}

pub struct ConfigFetcher {
    client: reqwest::Client,
}

impl ConfigFetcher {
    /// The client ignores `HTTP_PROXY` and friends: the proxy being fetched
    /// for may be the one those variables point at.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Download `url` and atomically replace `dest` with the body.
    /// Returns the number of bytes written.
    pub async fn fetch_and_save(&self, url: &str, dest: &Path) -> Result<usize, FetchError> {
        let url = validate_url(url)?;
        debug!("GET {url}");

        let response = self.client.get(url.clone()).send().await.map_err(transport)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::BadStatus(status.as_u16()));
        }
        let body = response.bytes().await.map_err(transport)?;
        info!("downloaded {} bytes from {url}", body.len());

        let len = body.len();
        let target = dest.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomically(&target, &body))
            .await
            .map_err(|e| FetchError::WriteFailed(e.to_string()))?
            .map_err(|e| FetchError::WriteFailed(format!("{}: {e}", dest.display())))?;

        if !probe::exists(dest) {
            return Err(FetchError::WriteFailed(format!(
                "{} missing after write",
                dest.display()
            )));
        }
        Ok(len)
    }
}

fn transport(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

fn write_atomically(dest: &Path, body: &[u8]) -> std::io::Result<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
