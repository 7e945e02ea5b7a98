// src/exec/process.rs

//! Launch spec and process handle types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::types::StreamKind;

/// Opaque description of what to start. Never interpreted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Overrides layered on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Run `script` through the platform shell.
    pub fn shell(script: impl Into<String>) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(script)
        } else {
            Self::new("sh").arg("-c").arg(script)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// A raw read from one of the process's output pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub bytes: Bytes,
}

impl OutputChunk {
    pub fn new(stream: StreamKind, bytes: impl Into<Bytes>) -> Self {
        Self {
            stream,
            bytes: bytes.into(),
        }
    }
}

/// Signals the orchestrator can send to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Ask the process (group) to stop: SIGTERM on Unix.
    Terminate,
    /// Force the process (group) down: SIGKILL on Unix.
    Kill,
}

/// Cloneable sender side used to signal a process.
///
/// Signalling a process that already exited is a no-op.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    signals: mpsc::UnboundedSender<ProcessSignal>,
}

impl ProcessControl {
    pub fn kill(&self, signal: ProcessSignal) {
        // A closed channel means the process watcher is gone: already exited.
        let _ = self.signals.send(signal);
    }
}

/// One spawned OS process.
///
/// Output from stdout and stderr arrives merged, in read order, on a single
/// channel. The exit code is delivered exactly once, after both pipes have
/// been drained (or a backend-specific grace has passed).
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    output: mpsc::Receiver<OutputChunk>,
    exit: oneshot::Receiver<i32>,
    control: ProcessControl,
}

/// A [`ProcessHandle`] taken apart so its channels can be polled separately.
#[derive(Debug)]
pub struct ProcessParts {
    pub pid: Option<u32>,
    pub output: mpsc::Receiver<OutputChunk>,
    pub exit: oneshot::Receiver<i32>,
    pub control: ProcessControl,
}

impl ProcessHandle {
    /// Assemble a handle from the channels a backend feeds.
    pub fn new(
        pid: Option<u32>,
        output: mpsc::Receiver<OutputChunk>,
        exit: oneshot::Receiver<i32>,
        signals: mpsc::UnboundedSender<ProcessSignal>,
    ) -> Self {
        Self {
            pid,
            output,
            exit,
            control: ProcessControl { signals },
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn into_parts(self) -> ProcessParts {
        ProcessParts {
            pid: self.pid,
            output: self.output,
            exit: self.exit,
            control: self.control,
        }
    }
}
