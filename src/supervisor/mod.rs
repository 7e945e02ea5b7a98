// src/supervisor/mod.rs

//! Lifecycle supervision of a single run.
//!
//! One [`Supervisor`] task owns one process from spawn to cleanup. It races:
//! - process output (forwarded as line events),
//! - the process exit,
//! - the run's timeout,
//! - the heartbeat ticker,
//! - the run's stop token (abort, reset, replacement),
//! - the subscriber's disconnect token.
//!
//! Whatever fires first decides the ending. Every ending goes through the
//! same cleanup: kill if needed, unregister, deliver the terminal event if
//! someone is still listening, and settle the run.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exec::{OutputChunk, ProcessControl, ProcessHandle, ProcessParts, ProcessSignal};
use crate::registry::RunRegistry;
use crate::stream::{OutputMultiplexer, RunEvent, TerminalEvent};
use crate::types::ReplacePolicy;

pub use state::{RunControl, RunId, RunState};

/// Timing and policy knobs applied to every run.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    /// Default ceiling on a run's lifetime; callers may override per run.
    pub timeout: Duration,
    /// Keep-alive interval; `None` disables heartbeats.
    pub heartbeat: Option<Duration>,
    /// How long a process gets after SIGTERM before SIGKILL, and after
    /// SIGKILL before we give up waiting.
    pub kill_grace: Duration,
    pub replace_policy: ReplacePolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            heartbeat: Some(Duration::from_secs(15)),
            kill_grace: Duration::from_secs(5),
            replace_policy: ReplacePolicy::Replace,
        }
    }
}

impl RunSettings {
    /// Upper bound on how long stopping a run can take: SIGTERM grace,
    /// SIGKILL grace, and the terminal event delivery window.
    pub fn stop_bound(&self) -> Duration {
        self.kill_grace
            .saturating_mul(3)
            .saturating_add(Duration::from_millis(500))
    }
}

/// Roughly thirty years; stands in for deadlines that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Why the main loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Exited(i32),
    Stopped,
    TimedOut,
    Disconnected,
}

pub(crate) struct Supervisor {
    run: Arc<RunControl>,
    registry: Arc<RunRegistry>,
    events: mpsc::Sender<RunEvent>,
    disconnect: CancellationToken,
    timeout: Duration,
    heartbeat: Option<Duration>,
    kill_grace: Duration,
}

impl Supervisor {
    pub(crate) fn new(
        run: Arc<RunControl>,
        registry: Arc<RunRegistry>,
        events: mpsc::Sender<RunEvent>,
        disconnect: CancellationToken,
        settings: &RunSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            run,
            registry,
            events,
            disconnect,
            timeout,
            heartbeat: settings.heartbeat,
            kill_grace: settings.kill_grace,
        }
    }

    /// Drive the run to completion. Consumes the supervisor; spawn it.
    pub(crate) async fn run(self, handle: ProcessHandle) {
        let ProcessParts {
            pid,
            mut output,
            mut exit,
            control,
        } = handle.into_parts();

        self.run.mark_running();
        info!(
            run = %self.run.name(),
            run_id = %self.run.id(),
            ?pid,
            timeout_ms = self.timeout.as_millis() as u64,
            "run started"
        );

        let deadline = instant_after(self.timeout);
        let mut heartbeat = self.heartbeat.map(|period| {
            let mut ticker = interval_at(instant_after(period), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut mux = OutputMultiplexer::new();
        let mut output_open = true;

        let ending = loop {
            tokio::select! {
                biased;

                _ = self.disconnect.cancelled() => break Ending::Disconnected,
                _ = self.run.stop_token().cancelled() => break Ending::Stopped,
                _ = sleep_until(deadline) => break Ending::TimedOut,

                chunk = output.recv(), if output_open => match chunk {
                    Some(chunk) => {
                        if let Err(ending) = self.forward(mux.push(&chunk), Some(deadline)).await {
                            break ending;
                        }
                    }
                    None => output_open = false,
                },

                code = &mut exit => break Ending::Exited(code.unwrap_or(-1)),

                _ = next_tick(&mut heartbeat) => {
                    debug!(run = %self.run.name(), run_id = %self.run.id(), "heartbeat");
                    if let Err(ending) = self.forward(vec![RunEvent::Heartbeat], Some(deadline)).await {
                        break ending;
                    }
                }
            }
        };

        let subscriber_gone = match ending {
            Ending::Exited(code) => {
                // The exit is only reported once the pipes are drained, so
                // whatever is left is already queued.
                let mut tail = Vec::new();
                while let Ok(chunk) = output.try_recv() {
                    tail.extend(mux.push(&chunk));
                }
                tail.extend(mux.finish());
                let gone = self.forward(tail, Some(instant_after(self.kill_grace))).await
                    == Err(Ending::Disconnected);

                self.run.try_finish(RunState::Completed(code));
                info!(
                    run = %self.run.name(),
                    run_id = %self.run.id(),
                    ?pid,
                    exit_code = code,
                    lines = mux.cursor(),
                    "run process exited"
                );
                gone
            }
            Ending::TimedOut => {
                if self.run.try_finish(RunState::TimedOut) {
                    warn!(
                        run = %self.run.name(),
                        run_id = %self.run.id(),
                        ?pid,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "run exceeded its timeout; killing process"
                    );
                }
                self.terminate(pid, &control, &mut exit, &mut output).await;
                false
            }
            Ending::Stopped => {
                self.run.try_finish(RunState::Aborted);
                info!(
                    run = %self.run.name(),
                    run_id = %self.run.id(),
                    ?pid,
                    "abort requested; killing process"
                );
                self.terminate(pid, &control, &mut exit, &mut output).await;
                false
            }
            Ending::Disconnected => {
                self.run.try_finish(RunState::Aborted);
                info!(
                    run = %self.run.name(),
                    run_id = %self.run.id(),
                    ?pid,
                    "subscriber disconnected; killing process"
                );
                self.terminate(pid, &control, &mut exit, &mut output).await;
                true
            }
        };

        self.finish(subscriber_gone).await;
    }

    /// Send events in order, giving up if the run is told to end meanwhile.
    async fn forward(&self, events: Vec<RunEvent>, deadline: Option<Instant>) -> Result<(), Ending> {
        for event in events {
            self.deliver(event, deadline).await?;
        }
        Ok(())
    }

    async fn deliver(&self, event: RunEvent, deadline: Option<Instant>) -> Result<(), Ending> {
        let timed_out = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.disconnect.cancelled() => Err(Ending::Disconnected),
            _ = self.run.stop_token().cancelled() => Err(Ending::Stopped),
            _ = timed_out => Err(Ending::TimedOut),
            sent = self.events.send(event) => sent.map_err(|_| Ending::Disconnected),
        }
    }

    /// SIGTERM, wait, SIGKILL, wait, then give up.
    async fn terminate(
        &self,
        pid: Option<u32>,
        control: &ProcessControl,
        exit: &mut oneshot::Receiver<i32>,
        output: &mut mpsc::Receiver<OutputChunk>,
    ) {
        control.kill(ProcessSignal::Terminate);
        if let Some(code) = wait_for_exit(exit, output, self.kill_grace).await {
            debug!(run = %self.run.name(), ?pid, exit_code = code, "process exited after SIGTERM");
            return;
        }

        warn!(
            run = %self.run.name(),
            run_id = %self.run.id(),
            ?pid,
            grace_ms = self.kill_grace.as_millis() as u64,
            "process ignored SIGTERM; escalating to SIGKILL"
        );
        control.kill(ProcessSignal::Kill);
        if let Some(code) = wait_for_exit(exit, output, self.kill_grace).await {
            debug!(run = %self.run.name(), ?pid, exit_code = code, "process exited after SIGKILL");
            return;
        }

        error!(
            run = %self.run.name(),
            run_id = %self.run.id(),
            ?pid,
            "process still alive after SIGKILL; giving up"
        );
    }

    async fn finish(&self, subscriber_gone: bool) {
        if self.registry.unregister(self.run.name(), self.run.id()) {
            debug!(run = %self.run.name(), run_id = %self.run.id(), "unregistered");
        }

        if !subscriber_gone {
            let terminal = terminal_event(self.run.state());
            let delivered = tokio::select! {
                biased;
                _ = self.disconnect.cancelled() => false,
                sent = self.events.send(RunEvent::Terminal(terminal.clone())) => sent.is_ok(),
                _ = sleep(self.kill_grace) => false,
            };
            if delivered {
                debug!(run = %self.run.name(), run_id = %self.run.id(), ?terminal, "terminal event delivered");
            } else {
                debug!(run = %self.run.name(), run_id = %self.run.id(), "no subscriber for terminal event");
            }
        }

        let elapsed_ms = self
            .run
            .started_at()
            .elapsed()
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        info!(
            run = %self.run.name(),
            run_id = %self.run.id(),
            state = ?self.run.state(),
            elapsed_ms,
            "run finished"
        );
        self.run.settle();
    }
}

/// Wait up to `grace` for the exit code, discarding output meanwhile so the
/// pipe readers never block.
async fn wait_for_exit(
    exit: &mut oneshot::Receiver<i32>,
    output: &mut mpsc::Receiver<OutputChunk>,
    grace: Duration,
) -> Option<i32> {
    let expired = sleep(grace);
    tokio::pin!(expired);

    loop {
        tokio::select! {
            code = &mut *exit => return Some(code.unwrap_or(-1)),
            Some(_) = output.recv() => continue,
            _ = &mut expired => return None,
        }
    }
}

/// `now + after`, saturating at a point far enough out to never fire.
fn instant_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn terminal_event(state: RunState) -> TerminalEvent {
    match state {
        RunState::Completed(code) => TerminalEvent::Completed { code },
        RunState::TimedOut => TerminalEvent::TimedOut,
        RunState::Errored => TerminalEvent::Errored {
            message: "run failed".to_string(),
        },
        // `finish` only runs after a terminal transition; a still-live state
        // here can only mean the run was cut short.
        RunState::Aborted | RunState::Starting | RunState::Running => TerminalEvent::Aborted,
    }
}
