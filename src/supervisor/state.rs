// src/supervisor/state.rs

//! Per-run lifecycle state shared between the supervisor, the registry and
//! the orchestrator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Process-wide unique run identifier.
///
/// Two runs under the same name always have different ids, which is what
/// lets stale cleanup tell "my run" from "the run that replaced me".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

impl RunId {
    pub fn next() -> Self {
        RunId(NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Starting,
    Running,
    Completed(i32),
    Aborted,
    TimedOut,
    Errored,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunState::Starting | RunState::Running)
    }
}

/// Shared control block of one run: its identity, its state, and the tokens
/// used to stop it and to observe that it has fully wound down.
///
/// The registry stores these; the supervisor owns the process.
#[derive(Debug)]
pub struct RunControl {
    id: RunId,
    name: String,
    started_at: SystemTime,
    state: watch::Sender<RunState>,
    settled: watch::Sender<bool>,
    stop: CancellationToken,
}

impl RunControl {
    pub fn new(name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(RunState::Starting);
        let (settled, _) = watch::channel(false);
        Self {
            id: RunId::next(),
            name: name.into(),
            started_at: SystemTime::now(),
            state,
            settled,
            stop: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// `starting -> running`. Returns false if the run already moved on.
    pub fn mark_running(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == RunState::Starting {
                *state = RunState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Move to a terminal state. Only the first terminal transition wins;
    /// later attempts return false and change nothing.
    pub fn try_finish(&self, terminal: RunState) -> bool {
        debug_assert!(terminal.is_terminal());
        let won = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = terminal;
                true
            }
        });
        if !won {
            debug!(run = %self.name, run_id = %self.id, ?terminal, "terminal transition lost the race; dropped");
        }
        won
    }

    /// Mark the run aborted and wake its supervisor.
    ///
    /// Returns true if this call performed the transition.
    pub fn abort(&self) -> bool {
        let won = self.try_finish(RunState::Aborted);
        self.stop.cancel();
        won
    }

    /// Cancelled when the run is asked to stop (abort, reset, replacement).
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Signal that the process is gone and the subscriber has been served.
    pub fn settle(&self) {
        self.settled.send_replace(true);
    }

    pub fn is_settled(&self) -> bool {
        *self.settled.borrow()
    }

    /// Wait until [`settle`](Self::settle) has been called.
    pub async fn settled(&self) {
        let mut rx = self.settled.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|settled| *settled).await;
    }
}
