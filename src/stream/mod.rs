// src/stream/mod.rs

//! Turning raw process output into the event sequence a subscriber sees.
//!
//! A run's subscriber receives, in order:
//! - zero or more [`RunEvent::Line`]s, merged from stdout and stderr in the
//!   order their chunks arrived,
//! - [`RunEvent::Heartbeat`]s interleaved during silence,
//! - exactly one [`RunEvent::Terminal`], always last.
//!
//! [`lines`] holds the byte-to-line splitter; [`multiplexer`] numbers lines
//! across both pipes; [`subscription`] is the receiving end handed to the
//! transport.

pub mod lines;
pub mod multiplexer;
pub mod subscription;

use serde::Serialize;

use crate::types::StreamKind;

pub use lines::LineSplitter;
pub use multiplexer::OutputMultiplexer;
pub use subscription::RunSubscription;

/// One complete line of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    /// Position of this line in the run's output, starting at 1.
    pub seq: u64,
    pub stream: StreamKind,
    pub text: String,
}

/// How a run ended. Delivered once, as the final event of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalEvent {
    /// The process exited on its own; nonzero codes are not orchestration errors.
    Completed { code: i32 },
    /// Aborted explicitly, by a reset, or by a newer run under the same name.
    Aborted,
    /// Killed after exceeding its timeout.
    TimedOut,
    /// The process could not be started.
    Errored { message: String },
}

impl TerminalEvent {
    /// Exit status a CLI front-end should report for this ending.
    pub fn exit_status(&self) -> i32 {
        match self {
            TerminalEvent::Completed { code } => *code,
            TerminalEvent::Aborted => 130,
            TerminalEvent::TimedOut => 124,
            TerminalEvent::Errored { .. } => 1,
        }
    }
}

/// Everything a run's subscriber can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Line(LineEvent),
    /// Keep-alive during silence; carries no data.
    Heartbeat,
    Terminal(TerminalEvent),
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Terminal(_))
    }
}
