// src/server/sse.rs

//! Rendering run events as server-sent events.
//!
//! [`SseFrame`] is the transport-neutral shape of one event; it converts
//! into an axum [`Event`] at the edge.

use axum::response::sse::Event;
use tracing::warn;

use crate::stream::{RunEvent, TerminalEvent};

/// One SSE frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Named event type; `None` for plain `message` events.
    pub event: Option<&'static str>,
    pub id: Option<String>,
    pub data: Option<String>,
    /// Comment line; ignored by clients, keeps the connection warm.
    pub comment: Option<&'static str>,
}

impl SseFrame {
    /// Frame for a run event.
    ///
    /// Lines become unnamed data events carrying their sequence number as
    /// the event id. Heartbeats are comments. Terminal markers are named
    /// events with a JSON body.
    pub fn from_event(event: &RunEvent) -> Self {
        match event {
            RunEvent::Line(line) => SseFrame {
                id: Some(line.seq.to_string()),
                data: Some(line.text.clone()),
                ..SseFrame::default()
            },
            RunEvent::Heartbeat => SseFrame {
                comment: Some("heartbeat"),
                ..SseFrame::default()
            },
            RunEvent::Terminal(terminal) => SseFrame {
                event: Some(marker_name(terminal)),
                data: Some(marker_body(terminal)),
                ..SseFrame::default()
            },
        }
    }
}

impl From<SseFrame> for Event {
    fn from(frame: SseFrame) -> Self {
        let mut event = Event::default();
        if let Some(name) = frame.event {
            event = event.event(name);
        }
        if let Some(id) = frame.id {
            event = event.id(id);
        }
        if let Some(data) = frame.data {
            event = event.data(data);
        }
        if let Some(comment) = frame.comment {
            event = event.comment(comment);
        }
        event
    }
}

/// SSE event name of a terminal marker.
pub fn marker_name(terminal: &TerminalEvent) -> &'static str {
    match terminal {
        TerminalEvent::Completed { .. } => "exit",
        TerminalEvent::Aborted => "aborted",
        TerminalEvent::TimedOut => "timeout",
        TerminalEvent::Errored { .. } => "error",
    }
}

fn marker_body(terminal: &TerminalEvent) -> String {
    serde_json::to_string(terminal).unwrap_or_else(|e| {
        warn!(error = %e, "failed to encode terminal marker");
        r#"{"state":"errored"}"#.to_string()
    })
}
