// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::parse_duration;

/// Command-line arguments for `runherd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "runherd",
    version,
    about = "Launch named commands, stream their output live, and keep them on a leash.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Runherd.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "Runherd.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNHERD_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve the run catalog over HTTP with live SSE output.
    Serve {
        /// Address to listen on; overrides `[server].bind`.
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Run one catalog entry in the foreground, printing its output.
    ///
    /// Exits with the child's exit code; 130 when aborted (Ctrl-C), 124 on
    /// timeout, 1 if the process could not be started.
    Run {
        /// Catalog name of the run.
        name: String,

        /// Override the run's timeout, e.g. `90s` or `5m`.
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Print the names in the run catalog.
    List,

    /// Parse + validate the config and print the resolved catalog.
    Check,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
