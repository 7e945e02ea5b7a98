// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod stream;
pub mod supervisor;
pub mod types;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_and_validate};
use crate::exec::RealProcessBackend;
use crate::orchestrator::{Orchestrator, RunOptions};
use crate::server::sse::marker_name;
use crate::stream::{RunEvent, TerminalEvent};

/// High-level entry point used by `main.rs`.
///
/// Loads the config and dispatches the subcommand. Returns the process exit
/// code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    match args.command {
        Command::Check => {
            print_check(&cfg);
            Ok(0)
        }
        Command::List => {
            for name in cfg.run_names() {
                println!("{name}");
            }
            Ok(0)
        }
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let orchestrator = Orchestrator::from_config(RealProcessBackend::new(), &cfg);
            server::bind_and_serve(&addr, orchestrator, shutdown_signal()).await?;
            Ok(0)
        }
        Command::Run { name, timeout } => {
            let orchestrator = Orchestrator::from_config(RealProcessBackend::new(), &cfg);
            run_in_terminal(orchestrator, &name, timeout).await
        }
    }
}

/// Stream one run to the terminal: lines on stdout, the final marker on
/// stderr. Ctrl-C aborts the run.
async fn run_in_terminal(
    orchestrator: Orchestrator<RealProcessBackend>,
    name: &str,
    timeout: Option<Duration>,
) -> Result<i32> {
    let mut subscription = orchestrator
        .start_catalog_run(name, RunOptions { timeout })
        .await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(RunEvent::Line(line)) => println!("{}", line.text),
                Some(RunEvent::Heartbeat) => debug!(run = %name, "heartbeat"),
                Some(RunEvent::Terminal(terminal)) => {
                    eprintln!("[{name}] {}", describe(&terminal));
                    return Ok(terminal.exit_status());
                }
                None => {
                    warn!(run = %name, "event stream ended without a terminal marker");
                    return Ok(1);
                }
            },
            res = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    continue;
                }
                // Keep reading while the abort winds down; the aborted
                // marker arrives on the subscription.
                let orchestrator = orchestrator.clone();
                let name = name.to_string();
                tokio::spawn(async move {
                    orchestrator.abort_run(&name).await;
                });
            }
        }
    }
}

fn describe(terminal: &TerminalEvent) -> String {
    match terminal {
        TerminalEvent::Completed { code } => format!("{} (code {code})", marker_name(terminal)),
        TerminalEvent::Errored { message } => format!("{}: {message}", marker_name(terminal)),
        TerminalEvent::Aborted | TerminalEvent::TimedOut => marker_name(terminal).to_string(),
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; shut down by killing the process");
        std::future::pending::<()>().await;
    }
}

/// Print the validated config: server, defaults, and each catalog entry.
fn print_check(cfg: &ConfigFile) {
    println!("runherd check");
    println!("  server.bind = {}", cfg.server.bind);
    println!("  defaults.timeout = {:?}", cfg.defaults.timeout);
    match cfg.defaults.heartbeat {
        Some(every) => println!("  defaults.heartbeat = {every:?}"),
        None => println!("  defaults.heartbeat = off"),
    }
    println!("  defaults.kill_grace = {:?}", cfg.defaults.kill_grace);
    println!("  defaults.replace_policy = {:?}", cfg.defaults.replace_policy);
    println!();

    println!("runs ({}):", cfg.catalog.len());
    for (name, entry) in cfg.catalog.iter() {
        println!("  - {name}");
        println!("      cmd: {}", entry.spec.program);
        if !entry.spec.args.is_empty() {
            println!("      args: {:?}", entry.spec.args);
        }
        if let Some(ref cwd) = entry.spec.cwd {
            println!("      cwd: {}", cwd.display());
        }
        if !entry.spec.env.is_empty() {
            println!("      env: {:?}", entry.spec.env);
        }
        if let Some(timeout) = entry.timeout {
            println!("      timeout: {timeout:?}");
        }
    }

    debug!("check complete (no execution)");
}
