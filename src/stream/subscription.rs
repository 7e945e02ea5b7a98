// src/stream/subscription.rs

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::stream::RunEvent;
use crate::supervisor::RunId;

/// The single live subscriber end of a run.
///
/// Yields the run's events and ends after the terminal event. Dropping the
/// subscription before that cancels the run's disconnect token, which makes
/// the supervisor kill the process: transports only have to drop this value
/// when their client goes away.
#[derive(Debug)]
pub struct RunSubscription {
    id: RunId,
    name: String,
    pid: Option<u32>,
    events: ReceiverStream<RunEvent>,
    _disconnect: DropGuard,
}

impl RunSubscription {
    pub(crate) fn new(
        id: RunId,
        name: String,
        pid: Option<u32>,
        events: mpsc::Receiver<RunEvent>,
        disconnect: CancellationToken,
    ) -> Self {
        Self {
            id,
            name,
            pid,
            events: ReceiverStream::new(events),
            _disconnect: disconnect.drop_guard(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id, if the process was spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next event, or `None` once the stream is over.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.events.as_mut().recv().await
    }
}

impl Stream for RunSubscription {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}
