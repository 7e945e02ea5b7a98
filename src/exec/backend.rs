// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The supervisor talks to a `ProcessBackend` instead of `tokio::process`
//! directly. This makes it easy to swap in a scripted fake in tests while
//! keeping the production implementation here.
//!
//! - `RealProcessBackend` is the default implementation used by `runherd`.
//!   Each child gets its own process group so signals reach everything it
//!   started.
//! - Tests can provide their own `ProcessBackend` that, for example, replays
//!   canned output chunks and exit codes.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::SpawnError;
use crate::exec::process::{LaunchSpec, OutputChunk, ProcessHandle, ProcessSignal};
use crate::types::StreamKind;

const OUTPUT_CHANNEL_CAPACITY: usize = 256;
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// How long to keep waiting for the pipes after the process itself exited.
///
/// A grandchild that inherited stdout can hold the pipe open indefinitely.
const READER_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Trait abstracting how runs are turned into OS processes.
///
/// Production code uses [`RealProcessBackend`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait ProcessBackend: Send + Sync + 'static {
    /// Start the process described by `spec`.
    ///
    /// Must be called from within a Tokio runtime.
    fn spawn(&self, spec: &LaunchSpec) -> Result<ProcessHandle, SpawnError>;
}

/// Real process backend used in production.
#[derive(Debug, Clone, Default)]
pub struct RealProcessBackend;

impl RealProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessBackend for RealProcessBackend {
    fn spawn(&self, spec: &LaunchSpec) -> Result<ProcessHandle, SpawnError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SpawnError {
            program: spec.program.clone(),
            cwd: spec.cwd.clone(),
            source,
        })?;

        let pid = child.id();
        info!(program = %spec.program, ?pid, "process spawned");

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, StreamKind::Stdout, output_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, StreamKind::Stderr, output_tx)));
        }

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(watch_child(child, pid, signal_rx, readers, exit_tx));

        Ok(ProcessHandle::new(pid, output_rx, exit_rx, signal_tx))
    }
}

/// Forward raw reads from one pipe into the merged output channel.
async fn pump<R>(mut reader: R, stream: StreamKind, tx: mpsc::Sender<OutputChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = OutputChunk::new(stream, Bytes::copy_from_slice(&buf[..n]));
                if tx.send(chunk).await.is_err() {
                    // Nobody is listening any more.
                    break;
                }
            }
            Err(e) => {
                debug!(stream = stream.as_str(), error = %e, "pipe read failed");
                break;
            }
        }
    }
}

/// Own the child until it exits: deliver signals, reap it, report the code.
async fn watch_child(
    mut child: Child,
    pid: Option<u32>,
    mut signals: mpsc::UnboundedReceiver<ProcessSignal>,
    readers: Vec<JoinHandle<()>>,
    exit_tx: oneshot::Sender<i32>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = signals.recv() => deliver_signal(&mut child, pid, signal),
        }
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!(?pid, error = %e, "waiting for process failed");
            -1
        }
    };
    debug!(?pid, exit_code = code, "process reaped");

    let drained = tokio::time::timeout(READER_DRAIN_GRACE, futures::future::join_all(readers)).await;
    if drained.is_err() {
        debug!(?pid, "output pipes still open after exit; reporting exit anyway");
    }

    let _ = exit_tx.send(code);
}

#[cfg(unix)]
fn deliver_signal(child: &mut Child, pid: Option<u32>, signal: ProcessSignal) {
    let Some(pid) = pid else {
        return;
    };
    let signo = match signal {
        ProcessSignal::Terminate => libc::SIGTERM,
        ProcessSignal::Kill => libc::SIGKILL,
    };
    debug!(pid, ?signal, "signalling process group");

    // The child leads its own process group (see `process_group(0)`), and it
    // has not been reaped yet, so the group id cannot have been reused.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signo) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        debug!(pid, error = %err, "killpg failed; signalling the child directly");
        if signal == ProcessSignal::Kill {
            if let Err(e) = child.start_kill() {
                warn!(pid, error = %e, "failed to kill process");
            }
        } else {
            unsafe {
                libc::kill(pid as libc::pid_t, signo);
            }
        }
    }
}

#[cfg(not(unix))]
fn deliver_signal(child: &mut Child, pid: Option<u32>, signal: ProcessSignal) {
    debug!(?pid, ?signal, "killing process");
    if let Err(e) = child.start_kill() {
        warn!(?pid, error = %e, "failed to kill process");
    }
}

/// Exit code of a finished process; killed processes get `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
