// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::exec::LaunchSpec;
use crate::supervisor::RunSettings;
use crate::types::ReplacePolicy;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// bind = "127.0.0.1:3000"
///
/// [defaults]
/// timeout = "10m"
/// heartbeat = "15s"
/// kill_grace = "5s"
/// replace_policy = "replace"
/// env = { FORCE_COLOR = "0" }
///
/// [run."links.spec.js"]
/// cmd = "npx"
/// args = ["playwright", "test", "tests/links.spec.js", "--reporter", "list"]
/// timeout = "5m"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// HTTP transport settings from `[server]`.
    #[serde(default)]
    pub server: ServerSection,

    /// Settings applied to every run from `[defaults]`.
    #[serde(default)]
    pub defaults: DefaultsSection,

    /// The run catalog from `[run.<name>]`.
    ///
    /// Keys are the *run names* the UI starts runs by (e.g. `"links.spec.js"`,
    /// `"Scraper"`, `"auth-check"`).
    #[serde(default)]
    pub run: BTreeMap<String, RunConfig>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Socket address the HTTP server listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// `[defaults]` section.
///
/// Durations are kept as strings here and parsed during validation.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    /// Ceiling on how long a run may live before it is killed.
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Interval between keep-alive events on an otherwise silent stream.
    /// `"0s"` disables heartbeats.
    #[serde(default = "default_heartbeat")]
    pub heartbeat: String,

    /// How long a terminated process gets before it is force-killed.
    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,

    /// Working directory for runs that do not set their own.
    ///
    /// Relative paths are resolved against the directory of the config file.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// `"replace"` (default) or `"reject"`.
    #[serde(default)]
    pub replace_policy: ReplacePolicy,

    /// Environment overrides applied to every run (under the run's own).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_timeout() -> String {
    "10m".to_string()
}

fn default_heartbeat() -> String {
    "15s".to_string()
}

fn default_kill_grace() -> String {
    "5s".to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            heartbeat: default_heartbeat(),
            kill_grace: default_kill_grace(),
            cwd: None,
            replace_policy: ReplacePolicy::default(),
            env: BTreeMap::new(),
        }
    }
}

/// `[run.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Executable to launch. Looked up on `PATH` when not a path.
    pub cmd: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides for this run only.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory; falls back to `defaults.cwd`.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Per-run timeout ceiling; falls back to `defaults.timeout`.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Validated `[defaults]` with durations resolved.
#[derive(Debug, Clone)]
pub struct RunDefaults {
    pub timeout: Duration,
    pub heartbeat: Option<Duration>,
    pub kill_grace: Duration,
    pub cwd: Option<PathBuf>,
    pub replace_policy: ReplacePolicy,
    pub env: BTreeMap<String, String>,
}

impl RunDefaults {
    /// Supervisor settings derived from these defaults.
    pub fn settings(&self) -> RunSettings {
        RunSettings {
            timeout: self.timeout,
            heartbeat: self.heartbeat,
            kill_grace: self.kill_grace,
            replace_policy: self.replace_policy,
        }
    }
}

/// A startable entry of the run catalog.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub spec: LaunchSpec,
    /// Overrides the default timeout when set.
    pub timeout: Option<Duration>,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so every catalog entry
/// has a non-empty name and command and every duration has been parsed.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub defaults: RunDefaults,
    pub catalog: BTreeMap<String, CatalogEntry>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        server: ServerSection,
        defaults: RunDefaults,
        catalog: BTreeMap<String, CatalogEntry>,
    ) -> Self {
        Self {
            server,
            defaults,
            catalog,
        }
    }

    /// Resolve relative working directories against `root`.
    pub fn resolve_relative_to(&mut self, root: &Path) {
        if let Some(cwd) = self.defaults.cwd.as_mut() {
            if cwd.is_relative() {
                *cwd = root.join(&*cwd);
            }
        }
        for entry in self.catalog.values_mut() {
            if let Some(cwd) = entry.spec.cwd.as_mut() {
                if cwd.is_relative() {
                    *cwd = root.join(&*cwd);
                }
            }
        }
    }

    pub fn run_names(&self) -> impl Iterator<Item = &str> {
        self.catalog.keys().map(|s| s.as_str())
    }
}
