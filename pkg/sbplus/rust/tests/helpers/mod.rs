// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use sing_box_plus::controller::{Controller, Event};
use sing_box_plus::fetch::{ConfigFetcher, DEFAULT_FETCH_TIMEOUT};
use sing_box_plus::kill::SystemKiller;
use sing_box_plus::process::CoreOutput;
use sing_box_plus::settings::{Paths, Settings};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimal HTTP/1.1 responder that counts the connections it served.
pub struct HttpStub {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl HttpStub {
    pub async fn start(status_line: &'static str, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        Self {
            url: format!("http://{addr}/good.json"),
            hits,
        }
    }

    /// Accepts connections and never answers.
    pub async fn hanging() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(sock);
            }
        });
        Self {
            url: format!("http://{addr}/slow.json"),
            hits,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Paths rooted at `dir` with the core running under `core_name`.
pub fn paths(dir: &Path, core_name: &str) -> Paths {
    let settings = Settings {
        core_file: core_name.to_string(),
        ..Settings::default()
    };
    Paths::new(dir, &settings)
}

/// Install a fake core: `<dir>/<core_name>` is `/bin/sh` under another name,
/// and `run` (its only argument) is the script it executes.
#[cfg(unix)]
pub fn fake_core(dir: &Path, core_name: &str, script: &str) -> Paths {
    std::os::unix::fs::symlink("/bin/sh", dir.join(core_name)).unwrap();
    std::fs::write(dir.join("run"), script).unwrap();
    paths(dir, core_name)
}

pub fn write_config(paths: &Paths, contents: &str) {
    std::fs::write(&paths.config, contents).unwrap();
}

pub fn controller(paths: Paths, elevated: bool) -> Controller {
    controller_with_timeout(paths, elevated, DEFAULT_FETCH_TIMEOUT)
}

pub fn controller_with_timeout(paths: Paths, elevated: bool, timeout: Duration) -> Controller {
    Controller::new(
        paths,
        elevated,
        ConfigFetcher::new(timeout).unwrap(),
        CoreOutput::Null,
        Arc::new(SystemKiller),
    )
}

/// Wait for the next background completion and apply it.
pub async fn pump(controller: &mut Controller) -> Event {
    let event = tokio::time::timeout(EVENT_TIMEOUT, controller.next_event())
        .await
        .expect("timed out waiting for controller event")
        .expect("event channels closed");
    controller.handle_event(event.clone());
    event
}

/// Run the CLI binary against `work_dir`.
pub fn run_cli(work_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sing-box-plus"))
        .arg("--work-dir")
        .arg(work_dir)
        .args(args)
        .env_remove("SBP_WORK_DIR")
        .output()
        .expect("failed to run sing-box-plus")
}

/// Run the interactive console against `work_dir`, feeding it `input`.
pub fn run_console(work_dir: &Path, input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_sing-box-plus"))
        .arg("--work-dir")
        .arg(work_dir)
        .env_remove("SBP_WORK_DIR")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start sing-box-plus");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("failed to write console input");
    child.wait_with_output().expect("failed to wait for sing-box-plus")
}
