// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{debug, info};
use sbplus_log::LogConfig;
use sing_box_plus::VERSION;
use sing_box_plus::controller::{Controller, Event};
use sing_box_plus::fetch::ConfigFetcher;
use sing_box_plus::kill::SystemKiller;
use sing_box_plus::privilege;
use sing_box_plus::process::CoreOutput;
use sing_box_plus::settings::{self, Paths, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "sing-box-plus", version, about = "Supervise a local sing-box core")]
struct Cli {
    /// Directory holding the core, its config and the log file.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Mirror log records to stderr.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show privilege, file presence and permitted actions.
    Status,
    /// Download the subscription config.
    Fetch { url: String },
    /// Start the core and wait until it exits.
    Start,
    /// Kill the core by name.
    Stop,
    /// Interactive session (default).
    Console,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let work_dir = settings::resolve_work_dir(cli.work_dir)?;
    let settings = Settings::load(&work_dir)?;
    let paths = Paths::new(&work_dir, &settings);

    let mut log_config = LogConfig::new(&paths.log);
    log_config.level = settings.level_filter()?;
    log_config.max_size = settings.log_max_size;
    log_config.stderr = cli.verbose;
    sbplus_log::init(log_config).context("initializing logging")?;

    info!("Initializing sing-box-plus {VERSION}");
    info!("sing-box path: {}", paths.core.display());
    info!("Config path: {}", paths.config.display());
    info!("Log path: {}", paths.log.display());
    let elevated = privilege::is_elevated();
    info!("Is it admin: {elevated}");

    let fetcher = ConfigFetcher::new(settings.fetch_timeout())?;
    let mut controller = Controller::new(
        paths,
        elevated,
        fetcher,
        CoreOutput::from_setting(&settings.core_output),
        Arc::new(SystemKiller),
    );

    let result: Result<()> = match cli.command.unwrap_or(Command::Console) {
        Command::Status => {
            print_status(&controller);
            Ok(())
        }
        Command::Fetch { url } => fetch(&mut controller, &url).await,
        Command::Start => start_attached(&mut controller).await,
        Command::Stop => {
            let outcome = controller.stop().await;
            println!("{}", controller.status());
            outcome.map(|_| ()).map_err(Into::into)
        }
        Command::Console => console(&mut controller).await,
    };
    log::logger().flush();
    result
}

fn print_status(controller: &Controller) {
    let a = controller.affordances();
    let paths = controller.paths();
    println!("sing-box Plus v{VERSION}");
    println!("  elevated:     {}", controller.is_elevated());
    println!(
        "  core:         {} ({})",
        paths.core.display(),
        if paths.core_exists() { "present" } else { "missing" }
    );
    println!(
        "  config:       {} ({})",
        paths.config.display(),
        if paths.config_exists() { "present" } else { "missing" }
    );
    println!("  core state:   {}", controller.core_state());
    println!(
        "  actions:      fetch={} start={} stop={}",
        a.config_entry && !controller.fetch_in_flight(),
        a.start,
        a.stop
    );
    if let Some(advisory) = a.advisory {
        println!("  {advisory}");
    }
}

async fn fetch(controller: &mut Controller, url: &str) -> Result<()> {
    if let Err(e) = controller.request_fetch(url) {
        println!("{}", controller.status());
        return Err(e.into());
    }
    println!("{}", controller.status());
    while let Some(event) = controller.next_event().await {
        let finished = matches!(&event, Event::FetchFinished(_));
        let failed = matches!(&event, Event::FetchFinished(done) if done.result.is_err());
        controller.handle_event(event);
        if finished {
            println!("{}", controller.status());
            if failed {
                bail!("config download failed");
            }
            return Ok(());
        }
    }
    Ok(())
}

async fn start_attached(controller: &mut Controller) -> Result<()> {
    if let Err(e) = controller.start() {
        println!("{}", controller.status());
        return Err(e.into());
    }
    println!("{}", controller.status());
    loop {
        tokio::select! {
            event = controller.next_event() => {
                let Some(event) = event else { break };
                let exited = matches!(event, Event::CoreExited(_));
                controller.handle_event(event);
                println!("{}", controller.status());
                if exited && !controller.core_state().is_alive() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl-C, stopping sing-box");
                if let Err(e) = controller.stop().await {
                    debug!("stop on Ctrl-C failed: {e}");
                }
                println!("{}", controller.status());
                break;
            }
        }
    }
    Ok(())
}

const HELP: &str = "commands: fetch <url> | start | stop | status | help | quit";

async fn console(controller: &mut Controller) -> Result<()> {
    info!("Running sing-box PLUS ...");
    print_status(controller);
    println!("{}", controller.status());
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                if !dispatch(controller, line.trim()).await {
                    break;
                }
            }
            event = controller.next_event() => {
                let Some(event) = event else { break };
                controller.handle_event(event);
                println!("{}", controller.status());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl-C");
                break;
            }
        }
    }
    info!("sing-box-plus exiting");
    Ok(())
}

/// Run one console command. Returns false to leave the session.
async fn dispatch(controller: &mut Controller, line: &str) -> bool {
    let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
    let result = match cmd {
        "" => return true,
        "fetch" | "download" => controller.request_fetch(arg.trim()),
        "start" => controller.start().map(|_| ()),
        "stop" => controller.stop().await.map(|_| ()),
        "status" => {
            print_status(controller);
            Ok(())
        }
        "help" => {
            println!("{HELP}");
            return true;
        }
        "quit" | "exit" => return false,
        other => {
            println!("unknown command '{other}'; {HELP}");
            return true;
        }
    };
    if let Err(e) = result {
        debug!("console command '{cmd}' refused: {e}");
    }
    println!("{}", controller.status());
    true
}
