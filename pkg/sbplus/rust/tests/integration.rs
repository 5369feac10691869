// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

mod helpers;

use helpers::{
    HttpStub, controller, controller_with_timeout, paths, pump, run_cli, run_console, write_config,
};
use sing_box_plus::controller::{ADMIN_REQUIRED, CONFIG_REQUIRED, ControlError, Event};
use sing_box_plus::fetch::FetchError;
use sing_box_plus::privilege;
use sing_box_plus::process::StopOutcome;
use sing_box_plus::state::CoreState;
use std::time::Duration;

// ===========================================================================
// Group 1: Bootstrap and config download
// ===========================================================================

#[tokio::test]
async fn test_fresh_install_offers_config_entry_only() {
    let dir = tempfile::tempdir().unwrap();
    let ctl = controller(paths(dir.path(), "sing-box-core"), true);

    let a = ctl.affordances();
    assert!(a.config_entry);
    assert!(!a.start && !a.stop);
    assert_eq!(ctl.status(), CONFIG_REQUIRED);
}

#[tokio::test]
async fn test_download_enables_start_stop() {
    let stub = HttpStub::start("200 OK", r#"{"x":1}"#).await;
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = controller(paths(dir.path(), "sing-box-core"), true);

    ctl.request_fetch(&stub.url).unwrap();
    assert!(ctl.fetch_in_flight());
    assert_eq!(ctl.status(), "Downloading config file\nPlease wait...");

    let event = pump(&mut ctl).await;
    assert!(matches!(event, Event::FetchFinished(ref done) if done.result == Ok(7)));
    assert!(!ctl.fetch_in_flight());
    assert_eq!(ctl.status(), "Config file saved");
    assert_eq!(
        std::fs::read_to_string(&ctl.paths().config).unwrap(),
        r#"{"x":1}"#
    );

    let a = ctl.affordances();
    assert!(!a.config_entry);
    assert!(a.start && a.stop);
    assert_eq!(a.advisory, None);
}

#[tokio::test]
async fn test_bad_status_keeps_existing_config() {
    let stub = HttpStub::start("500 Internal Server Error", "boom").await;
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path(), "sing-box-core");
    write_config(&p, "previous");
    let mut ctl = controller(p, true);

    ctl.request_fetch(&stub.url).unwrap();
    pump(&mut ctl).await;

    assert_eq!(ctl.status(), "Failed to download config file!\nStatus code: 500");
    assert_eq!(
        std::fs::read_to_string(&ctl.paths().config).unwrap(),
        "previous"
    );
}

#[tokio::test]
async fn test_invalid_url_makes_no_request() {
    let stub = HttpStub::start("200 OK", "{}").await;
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = controller(paths(dir.path(), "sing-box-core"), true);

    for bad in ["", "example.com/good.json", "ftp://example.com/good.json"] {
        let err = ctl.request_fetch(bad).unwrap_err();
        assert!(matches!(err, ControlError::Fetch(FetchError::InvalidUrl(_))));
        assert_eq!(ctl.status(), "Invalid url!");
    }
    assert!(!ctl.fetch_in_flight());
    assert_eq!(stub.hits(), 0);
    assert!(!ctl.paths().config_exists());
}

#[tokio::test]
async fn test_only_one_fetch_in_flight() {
    let stub = HttpStub::hanging().await;
    let dir = tempfile::tempdir().unwrap();
    let mut ctl =
        controller_with_timeout(paths(dir.path(), "sing-box-core"), true, Duration::from_millis(500));

    ctl.request_fetch(&stub.url).unwrap();
    let err = ctl.request_fetch(&stub.url).unwrap_err();
    assert!(matches!(err, ControlError::FetchInFlight));

    pump(&mut ctl).await;
    assert!(!ctl.fetch_in_flight());
    assert_eq!(ctl.status(), "Failed to download config file!\ntime out error");
    assert_eq!(stub.hits(), 1);
}

#[tokio::test]
async fn test_unprivileged_session_offers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path(), "sing-box-core");
    write_config(&p, "{}");
    let mut ctl = controller(p, false);

    let a = ctl.affordances();
    assert!(!a.config_entry && !a.start && !a.stop);
    assert!(matches!(ctl.start(), Err(ControlError::NotElevated)));
    assert_eq!(ctl.core_state(), CoreState::NotStarted);
}

// ===========================================================================
// Group 2: Core lifecycle
// ===========================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_exit_code_one_is_clean_stop() {
    let dir = tempfile::tempdir().unwrap();
    let p = helpers::fake_core(dir.path(), "sbp-it-exit1", "exit 1\n");
    write_config(&p, "{}");
    let mut ctl = controller(p, true);

    ctl.start().unwrap();
    assert_eq!(ctl.core_state(), CoreState::Running);
    assert!(!ctl.affordances().start);

    let event = pump(&mut ctl).await;
    assert!(matches!(event, Event::CoreExited(exit) if exit.code == Some(1)));
    assert_eq!(ctl.core_state(), CoreState::Stopped);
    assert_eq!(ctl.status(), "sing-box stopped");
    assert!(ctl.affordances().start);
}

#[cfg(unix)]
#[tokio::test]
async fn test_other_exit_code_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let p = helpers::fake_core(dir.path(), "sbp-it-exit2", "exit 2\n");
    write_config(&p, "{}");
    let mut ctl = controller(p, true);

    ctl.start().unwrap();
    pump(&mut ctl).await;

    assert_eq!(ctl.core_state(), CoreState::Failed);
    assert!(ctl.status().contains('2'), "status was {:?}", ctl.status());
    assert!(ctl.affordances().start, "a failed core may be started again");
}

#[cfg(unix)]
#[tokio::test]
async fn test_crashed_core_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let p = helpers::fake_core(dir.path(), "sbp-it-segv", "kill -SEGV $$\nexit 1\n");
    write_config(&p, "{}");
    let mut ctl = controller(p, true);

    ctl.start().unwrap();
    let event = pump(&mut ctl).await;

    let segv = nix::sys::signal::Signal::SIGSEGV as i32;
    let Event::CoreExited(exit) = event else {
        panic!("expected core exit, got {event:?}");
    };
    assert_eq!((exit.code, exit.signal), (None, Some(segv)));
    assert_eq!(ctl.core_state(), CoreState::Failed);
    assert_eq!(ctl.status(), format!("sing-box terminated by signal {segv}"));
    assert!(ctl.affordances().start);
}

#[cfg(unix)]
#[tokio::test]
async fn test_core_sees_config_in_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let p = helpers::fake_core(
        dir.path(),
        "sbp-it-cwd",
        "test -f config.json || exit 3\nexit 1\n",
    );
    write_config(&p, "{}");
    let mut ctl = controller(p, true);

    ctl.start().unwrap();
    pump(&mut ctl).await;

    assert_eq!(ctl.core_state(), CoreState::Stopped);
}

#[cfg(unix)]
#[tokio::test]
async fn test_start_requires_config() {
    let dir = tempfile::tempdir().unwrap();
    let p = helpers::fake_core(dir.path(), "sbp-it-nocfg", "exit 1\n");
    let mut ctl = controller(p, true);

    assert!(ctl.start().is_err());
    assert_eq!(ctl.status(), "sing-box config not found!");
    assert_eq!(ctl.core_state(), CoreState::NotStarted);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_double_start_then_stop_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let p = helpers::fake_core(dir.path(), "sbp-it-stop", "sleep 30\nexit 0\n");
    write_config(&p, "{}");
    let mut ctl = controller(p, true);

    let pid = ctl.start().unwrap();
    let err = ctl.start().unwrap_err();
    assert!(err.to_string().contains("already running"));
    assert_eq!(ctl.status(), "sing-box is already running");

    // Wait until the child has exec'd and carries the core's name.
    let comm = format!("/proc/{pid}/comm");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::fs::read_to_string(&comm).map(|c| c.trim() != "sbp-it-stop").unwrap_or(true)
        && std::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let outcome = ctl.stop().await.unwrap();
    assert_eq!(outcome, StopOutcome::Stopped);
    assert_eq!(ctl.core_state(), CoreState::Stopped);
    assert_eq!(ctl.status(), "sing-box stopped successfully!");

    let event = pump(&mut ctl).await;
    assert!(matches!(event, Event::CoreExited(exit) if exit.pid == pid));
    assert_eq!(ctl.core_state(), CoreState::Stopped);
    assert_eq!(ctl.status(), "sing-box stopped successfully!");

    let outcome = ctl.stop().await.unwrap();
    assert_eq!(outcome, StopOutcome::NotRunning);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_stop_without_matching_process_is_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path(), "sbp-it-absent");
    write_config(&p, "{}");
    let mut ctl = controller(p, true);

    for _ in 0..2 {
        let outcome = ctl.stop().await.unwrap();
        assert_eq!(outcome, StopOutcome::NotRunning);
        assert_eq!(ctl.status(), "sing-box is not running!");
    }
    assert_eq!(ctl.core_state(), CoreState::NotStarted);
}

// ===========================================================================
// Group 3: Command line
// ===========================================================================

#[test]
fn test_cli_status_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();

    let out = run_cli(dir.path(), &["status"]);
    assert!(out.status.success(), "{out:?}");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("config.json (missing)"), "{stdout}");
    assert!(stdout.contains("core state:   not started"), "{stdout}");

    let log = std::fs::read_to_string(dir.path().join("logs.log")).unwrap();
    assert!(log.contains("INFO Initializing sing-box-plus"), "{log}");
}

#[test]
fn test_cli_fetch_rejects_invalid_url() {
    let dir = tempfile::tempdir().unwrap();

    let out = run_cli(dir.path(), &["fetch", "not-a-url"]);
    assert!(!out.status.success());
    assert!(!dir.path().join("config.json").exists());

    let stdout = String::from_utf8_lossy(&out.stdout);
    let expected = if privilege::is_elevated() {
        "Invalid url!"
    } else {
        ADMIN_REQUIRED
    };
    assert!(stdout.contains(expected), "{stdout}");
}

#[test]
fn test_cli_rejects_bad_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sing-box-plus.yaml"), "log_level: loud\n").unwrap();

    let out = run_cli(dir.path(), &["status"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("loud"));
}

#[test]
fn test_console_logs_refused_commands() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sing-box-plus.yaml"), "log_level: debug\n").unwrap();

    let out = run_console(dir.path(), "start\nquit\n");
    assert!(out.status.success(), "{out:?}");

    let log = std::fs::read_to_string(dir.path().join("logs.log")).unwrap();
    assert!(log.contains("console command 'start' refused"), "{log}");
    assert!(log.contains("sing-box-plus exiting"), "{log}");
}
