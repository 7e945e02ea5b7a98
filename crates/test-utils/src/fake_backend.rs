use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use runherd::errors::SpawnError;
use runherd::exec::{LaunchSpec, OutputChunk, ProcessBackend, ProcessHandle, ProcessSignal};
use runherd::types::StreamKind;

/// Exit code a fake process reports when it dies from a signal.
pub const TERMINATED_CODE: i32 = 128 + 15;
pub const KILLED_CODE: i32 = 128 + 9;

#[derive(Debug, Clone)]
enum Step {
    Output(StreamKind, Bytes),
    Sleep(Duration),
}

/// What a fake process does, step by step.
#[derive(Debug, Clone)]
pub struct FakeScript {
    steps: Vec<Step>,
    exit: Option<i32>,
    ignores_terminate: bool,
}

impl FakeScript {
    /// A script that exits 0 straight away.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            exit: Some(0),
            ignores_terminate: false,
        }
    }

    pub fn stdout(mut self, bytes: &str) -> Self {
        self.steps
            .push(Step::Output(StreamKind::Stdout, Bytes::copy_from_slice(bytes.as_bytes())));
        self
    }

    pub fn stderr(mut self, bytes: &str) -> Self {
        self.steps
            .push(Step::Output(StreamKind::Stderr, Bytes::copy_from_slice(bytes.as_bytes())));
        self
    }

    pub fn sleep(mut self, ms: u64) -> Self {
        self.steps.push(Step::Sleep(Duration::from_millis(ms)));
        self
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.exit = Some(code);
        self
    }

    /// Keep running after the last step until signalled.
    pub fn never_exits(mut self) -> Self {
        self.exit = None;
        self
    }

    /// Only SIGKILL stops this process.
    pub fn ignores_terminate(mut self) -> Self {
        self.ignores_terminate = true;
        self
    }
}

impl Default for FakeScript {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct Recorded {
    spawns: Vec<LaunchSpec>,
    signals: Vec<(String, ProcessSignal)>,
}

/// A `ProcessBackend` that plays scripts instead of starting processes.
///
/// Scripts are looked up by `LaunchSpec::program`; an unknown program fails
/// to spawn the way a missing executable would.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    scripts: Arc<Mutex<HashMap<String, FakeScript>>>,
    recorded: Arc<Mutex<Recorded>>,
}

static NEXT_FAKE_PID: AtomicU32 = AtomicU32::new(40_000);

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, program: &str, script: FakeScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(program.to_string(), script);
        self
    }

    /// Every spec passed to `spawn`, including failed ones.
    pub fn spawns(&self) -> Vec<LaunchSpec> {
        self.recorded.lock().unwrap().spawns.clone()
    }

    /// Signals received, tagged with the program they were sent to.
    pub fn signals(&self) -> Vec<(String, ProcessSignal)> {
        self.recorded.lock().unwrap().signals.clone()
    }
}

impl ProcessBackend for FakeBackend {
    fn spawn(&self, spec: &LaunchSpec) -> Result<ProcessHandle, SpawnError> {
        self.recorded.lock().unwrap().spawns.push(spec.clone());

        let script = self.scripts.lock().unwrap().get(&spec.program).cloned();
        let Some(script) = script else {
            return Err(SpawnError {
                program: spec.program.clone(),
                cwd: spec.cwd.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            });
        };

        let pid = NEXT_FAKE_PID.fetch_add(1, Ordering::Relaxed);
        let (output_tx, output_rx) = mpsc::channel(64);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        let program = spec.program.clone();
        let recorded = Arc::clone(&self.recorded);
        tokio::spawn(async move {
            let code = play(script, output_tx, signal_rx, &program, &recorded).await;
            debug!(%program, pid, code, "fake process exited");
            let _ = exit_tx.send(code);
        });

        Ok(ProcessHandle::new(Some(pid), output_rx, exit_rx, signal_tx))
    }
}

async fn play(
    script: FakeScript,
    output: mpsc::Sender<OutputChunk>,
    mut signals: mpsc::UnboundedReceiver<ProcessSignal>,
    program: &str,
    recorded: &Mutex<Recorded>,
) -> i32 {
    let FakeScript {
        steps,
        exit,
        ignores_terminate,
    } = script;

    for step in steps {
        let work = async {
            match step {
                Step::Output(stream, bytes) => {
                    let _ = output.send(OutputChunk::new(stream, bytes)).await;
                }
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
            }
        };
        tokio::pin!(work);

        loop {
            tokio::select! {
                _ = &mut work => break,
                signal = signals.recv() => {
                    if let Some(code) = on_signal(signal, ignores_terminate, program, recorded) {
                        return code;
                    }
                }
            }
        }
    }

    match exit {
        Some(code) => code,
        None => loop {
            let signal = signals.recv().await;
            if let Some(code) = on_signal(signal, ignores_terminate, program, recorded) {
                return code;
            }
        },
    }
}

/// Exit code if `signal` ends the process.
fn on_signal(
    signal: Option<ProcessSignal>,
    ignores_terminate: bool,
    program: &str,
    recorded: &Mutex<Recorded>,
) -> Option<i32> {
    let Some(signal) = signal else {
        // Control handle dropped: the supervisor is gone.
        return Some(KILLED_CODE);
    };
    recorded
        .lock()
        .unwrap()
        .signals
        .push((program.to_string(), signal));

    match signal {
        ProcessSignal::Terminate if ignores_terminate => None,
        ProcessSignal::Terminate => Some(TERMINATED_CODE),
        ProcessSignal::Kill => Some(KILLED_CODE),
    }
}
