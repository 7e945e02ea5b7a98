#![allow(dead_code)]

use std::time::Duration;

use runherd::stream::{LineEvent, RunEvent, RunSubscription, TerminalEvent};

pub use runherd_test_utils::{
    ConfigFileBuilder, FakeBackend, FakeScript, RunConfigBuilder, init_tracing, quick_settings,
    with_timeout,
};

/// Read a subscription to its end.
pub async fn collect(mut subscription: RunSubscription) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.recv().await {
        events.push(event);
    }
    events
}

/// Read until the next line event, skipping heartbeats.
pub async fn next_line(subscription: &mut RunSubscription) -> Option<LineEvent> {
    while let Some(event) = subscription.recv().await {
        match event {
            RunEvent::Line(line) => return Some(line),
            RunEvent::Heartbeat => continue,
            RunEvent::Terminal(_) => return None,
        }
    }
    None
}

pub fn line_texts(events: &[RunEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            RunEvent::Line(line) => Some(line.text.clone()),
            _ => None,
        })
        .collect()
}

/// The terminal event, asserting it is the only one and comes last.
pub fn terminal_of(events: &[RunEvent]) -> TerminalEvent {
    let terminals = events.iter().filter(|event| event.is_terminal()).count();
    assert_eq!(terminals, 1, "expected exactly one terminal event in {events:?}");
    match events.last() {
        Some(RunEvent::Terminal(terminal)) => terminal.clone(),
        other => panic!("last event is not terminal: {other:?}"),
    }
}

/// Poll `check` every 20ms until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
