// src/stream/multiplexer.rs

use crate::exec::OutputChunk;
use crate::stream::lines::LineSplitter;
use crate::stream::{LineEvent, RunEvent};
use crate::types::StreamKind;

/// Merges stdout and stderr chunks into one numbered line sequence.
///
/// Each pipe keeps its own partial-line buffer, so a half line on stdout is
/// never glued to a stderr line. Lines are numbered in the order they are
/// completed, which follows chunk arrival order.
#[derive(Debug, Default)]
pub struct OutputMultiplexer {
    stdout: LineSplitter,
    stderr: LineSplitter,
    cursor: u64,
}

impl OutputMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line events completed by this chunk.
    pub fn push(&mut self, chunk: &OutputChunk) -> Vec<RunEvent> {
        let lines = self.splitter(chunk.stream).push(&chunk.bytes);
        lines
            .into_iter()
            .map(|text| self.emit(chunk.stream, text))
            .collect()
    }

    /// Flush partial lines left in either pipe, stdout first.
    pub fn finish(&mut self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        for stream in [StreamKind::Stdout, StreamKind::Stderr] {
            if let Some(text) = self.splitter(stream).finish() {
                events.push(self.emit(stream, text));
            }
        }
        events
    }

    /// Number of lines emitted so far.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn splitter(&mut self, stream: StreamKind) -> &mut LineSplitter {
        match stream {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        }
    }

    fn emit(&mut self, stream: StreamKind, text: String) -> RunEvent {
        self.cursor += 1;
        RunEvent::Line(LineEvent {
            seq: self.cursor,
            stream,
            text,
        })
    }
}
