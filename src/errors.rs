// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunherdError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid run name: {0:?}")]
    InvalidRunName(String),

    #[error("Unknown run: {0}")]
    UnknownRun(String),

    #[error("Run already active: {0}")]
    RunBusy(String),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The OS refused to start a process.
///
/// Reported once; the run goes to `errored` and is never retried.
#[derive(Error, Debug)]
#[error("failed to spawn `{program}`{}: {source}", cwd_suffix(.cwd))]
pub struct SpawnError {
    pub program: String,
    pub cwd: Option<PathBuf>,
    #[source]
    pub source: std::io::Error,
}

fn cwd_suffix(cwd: &Option<PathBuf>) -> String {
    match cwd {
        Some(dir) => format!(" in {}", dir.display()),
        None => String::new(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunherdError>;
