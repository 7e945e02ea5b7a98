// src/orchestrator.rs

//! The façade external callers use: start, abort, reset, list.
//!
//! Transports (the HTTP server, the terminal runner, tests) only ever talk
//! to an [`Orchestrator`]. It owns the registry and the process backend and
//! spawns one [`Supervisor`] task per run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CatalogEntry, ConfigFile};
use crate::errors::{Result, RunherdError};
use crate::exec::{LaunchSpec, ProcessBackend};
use crate::registry::RunRegistry;
use crate::stream::{RunEvent, RunSubscription, TerminalEvent};
use crate::supervisor::{RunControl, RunSettings, RunState, Supervisor};
use crate::types::ReplacePolicy;

/// Events buffered per run before the supervisor waits on the subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Per-call overrides for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Overrides the catalog and default timeouts.
    pub timeout: Option<Duration>,
}

/// Cheap to clone; clones share the same registry and backend.
pub struct Orchestrator<B: ProcessBackend> {
    inner: Arc<Inner<B>>,
}

struct Inner<B> {
    backend: B,
    registry: Arc<RunRegistry>,
    settings: RunSettings,
    catalog: BTreeMap<String, CatalogEntry>,
}

impl<B: ProcessBackend> Clone for Orchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: ProcessBackend> fmt::Debug for Orchestrator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.inner.settings)
            .field("active", &self.inner.registry.list_active())
            .field("catalog", &self.inner.catalog.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> Orchestrator<B> {
    /// Orchestrator with an empty catalog and its own registry.
    pub fn new(backend: B, settings: RunSettings) -> Self {
        Self::with_registry(backend, settings, BTreeMap::new(), Arc::new(RunRegistry::new()))
    }

    /// Orchestrator serving the catalog and defaults of a validated config.
    pub fn from_config(backend: B, cfg: &ConfigFile) -> Self {
        Self::with_registry(
            backend,
            cfg.defaults.settings(),
            cfg.catalog.clone(),
            Arc::new(RunRegistry::new()),
        )
    }

    /// Full constructor, with an injected registry.
    pub fn with_registry(
        backend: B,
        settings: RunSettings,
        catalog: BTreeMap<String, CatalogEntry>,
        registry: Arc<RunRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                registry,
                settings,
                catalog,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.inner.registry
    }

    pub fn settings(&self) -> &RunSettings {
        &self.inner.settings
    }

    /// Start `spec` under `name` and return its live event stream.
    ///
    /// Under [`ReplacePolicy::Replace`] an active run with the same name is
    /// aborted first, and this call waits (bounded) until it has wound down,
    /// so the old stream's `aborted` marker precedes any output of the new
    /// run. Under [`ReplacePolicy::Reject`] a busy name fails with
    /// [`RunherdError::RunBusy`].
    ///
    /// A spawn failure is not an `Err`: the returned stream carries a single
    /// `errored` terminal event.
    pub async fn start_run(
        &self,
        name: &str,
        spec: LaunchSpec,
        options: RunOptions,
    ) -> Result<RunSubscription> {
        if name.trim().is_empty() {
            return Err(RunherdError::InvalidRunName(name.to_string()));
        }

        let run = Arc::new(RunControl::new(name));
        let previous = match self.inner.settings.replace_policy {
            ReplacePolicy::Replace => self.inner.registry.register(Arc::clone(&run)),
            ReplacePolicy::Reject => match self.inner.registry.try_register(Arc::clone(&run)) {
                Ok(previous) => previous,
                Err(existing) => {
                    info!(run = %name, active_run_id = %existing.id(), "run busy; rejecting start");
                    return Err(RunherdError::RunBusy(name.to_string()));
                }
            },
        };
        let pending = PendingStart::new(Arc::clone(&run), Arc::clone(&self.inner.registry));
        if let Some(previous) = previous {
            self.await_settled(&previous).await;
        }
        // No await point past here: the run is handed off before we return.
        pending.disarm();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let disconnect = CancellationToken::new();

        // Another start may have replaced this run while we waited.
        if run.is_terminal() {
            debug!(run = %name, run_id = %run.id(), "superseded before spawn");
            return Ok(self.finish_unspawned(&run, events_tx, events_rx, disconnect, TerminalEvent::Aborted));
        }

        let handle = match self.inner.backend.spawn(&spec) {
            Ok(handle) => handle,
            Err(err) => {
                error!(run = %name, run_id = %run.id(), error = %err, "spawn failed");
                run.try_finish(RunState::Errored);
                let terminal = TerminalEvent::Errored {
                    message: err.to_string(),
                };
                return Ok(self.finish_unspawned(&run, events_tx, events_rx, disconnect, terminal));
            }
        };

        let pid = handle.pid();
        let timeout = options.timeout.unwrap_or(self.inner.settings.timeout);
        let supervisor = Supervisor::new(
            Arc::clone(&run),
            Arc::clone(&self.inner.registry),
            events_tx,
            disconnect.clone(),
            &self.inner.settings,
            timeout,
        );
        tokio::spawn(supervisor.run(handle));

        Ok(RunSubscription::new(
            run.id(),
            name.to_string(),
            pid,
            events_rx,
            disconnect,
        ))
    }

    /// Start the catalog entry called `name`.
    pub async fn start_catalog_run(&self, name: &str, options: RunOptions) -> Result<RunSubscription> {
        let entry = self
            .inner
            .catalog
            .get(name)
            .ok_or_else(|| RunherdError::UnknownRun(name.to_string()))?;

        let options = RunOptions {
            timeout: options.timeout.or(entry.timeout),
        };
        self.start_run(name, entry.spec.clone(), options).await
    }

    /// Abort whatever runs under `name`.
    ///
    /// Returns whether a live run was aborted; an idle name is a no-op that
    /// returns false. Waits (bounded) until the aborted run has wound down.
    pub async fn abort_run(&self, name: &str) -> bool {
        let Some(run) = self.inner.registry.get(name) else {
            debug!(run = %name, "abort requested but nothing is running");
            return false;
        };

        let was_active = run.abort();
        info!(run = %name, run_id = %run.id(), was_active, "abort requested");
        self.await_settled(&run).await;
        was_active
    }

    /// Abort every active run; returns how many were live.
    pub async fn reset_all(&self) -> usize {
        let runs = self.inner.registry.snapshot();
        let aborted = runs.iter().filter(|run| run.abort()).count();
        info!(aborted, registered = runs.len(), "reset requested");

        join_all(runs.iter().map(|run| self.await_settled(run))).await;
        aborted
    }

    /// Names of the runs the catalog can start, in order.
    ///
    /// Informational only: this does not reflect liveness.
    pub fn list_known_run_names(&self) -> Vec<String> {
        self.inner.catalog.keys().cloned().collect()
    }

    /// Names with a run currently registered, in order.
    pub fn list_active_runs(&self) -> Vec<String> {
        self.inner.registry.list_active()
    }

    /// Close out a run that never got a process.
    fn finish_unspawned(
        &self,
        run: &RunControl,
        events_tx: mpsc::Sender<RunEvent>,
        events_rx: mpsc::Receiver<RunEvent>,
        disconnect: CancellationToken,
        terminal: TerminalEvent,
    ) -> RunSubscription {
        self.inner.registry.unregister(run.name(), run.id());
        // Fresh channel with room to spare; cannot be full.
        let _ = events_tx.try_send(RunEvent::Terminal(terminal));
        run.settle();
        RunSubscription::new(run.id(), run.name().to_string(), None, events_rx, disconnect)
    }

    async fn await_settled(&self, run: &RunControl) {
        if run.is_settled() {
            return;
        }
        let bound = self.inner.settings.stop_bound();
        if tokio::time::timeout(bound, run.settled()).await.is_err() {
            warn!(
                run = %run.name(),
                run_id = %run.id(),
                bound_ms = bound.as_millis() as u64,
                "run did not wind down in time; continuing"
            );
        }
    }
}

/// Releases a registered run if its `start_run` future is dropped before a
/// supervisor (or `finish_unspawned`) takes it over.
struct PendingStart {
    run: Arc<RunControl>,
    registry: Arc<RunRegistry>,
    armed: bool,
}

impl PendingStart {
    fn new(run: Arc<RunControl>, registry: Arc<RunRegistry>) -> Self {
        Self {
            run,
            registry,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingStart {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.registry.unregister(self.run.name(), self.run.id());
        self.run.try_finish(RunState::Aborted);
        self.run.settle();
        info!(
            run = %self.run.name(),
            run_id = %self.run.id(),
            "start cancelled before spawn; run released"
        );
    }
}
