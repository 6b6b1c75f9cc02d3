//! Shared whiteboard mirroring.
//!
//! Outbound snapshots are debounced with trailing, latest-wins semantics:
//! a burst of edits sends one frame carrying the last snapshot once the
//! board has been quiet for the debounce interval.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::events;
use crate::signaling::ScopedChannel;

/// Full element list of the board. Elements are opaque to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhiteboardSnapshot {
    pub elements: Vec<Value>,
}

impl WhiteboardSnapshot {
    pub fn new(elements: Vec<Value>) -> Self {
        Self { elements }
    }

    /// Parse an inbound payload. Anything that is not an array is treated
    /// as an empty board.
    pub fn from_wire(data: Value) -> Self {
        match data {
            Value::Array(elements) => Self { elements },
            Value::Null => Self::default(),
            other => {
                debug!(payload = %other, "Whiteboard payload is not an element list");
                Self::default()
            }
        }
    }
}

/// Inbound whiteboard traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum WhiteboardEvent {
    Updated(WhiteboardSnapshot),
    Closed,
}

/// Local view of the teacher's board.
#[derive(Debug, Clone, Default)]
pub struct WhiteboardMirror {
    snapshot: Option<WhiteboardSnapshot>,
}

impl WhiteboardMirror {
    pub fn apply(&mut self, event: WhiteboardEvent) {
        match event {
            WhiteboardEvent::Updated(snapshot) => self.snapshot = Some(snapshot),
            WhiteboardEvent::Closed => self.snapshot = None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn elements(&self) -> &[Value] {
        self.snapshot
            .as_ref()
            .map(|s| s.elements.as_slice())
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Debounced broadcaster
// ---------------------------------------------------------------------------

enum BroadcastCommand {
    Update(WhiteboardSnapshot),
    Discard(oneshot::Sender<()>),
}

/// Handle to the background task that sends debounced snapshots.
pub struct WhiteboardBroadcaster {
    tx: mpsc::UnboundedSender<BroadcastCommand>,
    stop: CancellationToken,
}

impl WhiteboardBroadcaster {
    pub fn spawn(signaling: ScopedChannel, interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        tokio::spawn(debounce_loop(signaling, rx, interval, stop.clone()));
        Self { tx, stop }
    }

    /// Queue a snapshot. Only the last one of a burst is sent.
    pub fn update(&self, snapshot: WhiteboardSnapshot) {
        if self.tx.send(BroadcastCommand::Update(snapshot)).is_err() {
            debug!("Whiteboard broadcaster stopped, update dropped");
        }
    }

    /// Drop any pending snapshot. Once this returns nothing queued
    /// earlier will be sent.
    pub async fn discard_pending(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(BroadcastCommand::Discard(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for WhiteboardBroadcaster {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn debounce_loop(
    signaling: ScopedChannel,
    mut rx: mpsc::UnboundedReceiver<BroadcastCommand>,
    interval: Duration,
    stop: CancellationToken,
) {
    let mut pending: Option<WhiteboardSnapshot> = None;
    loop {
        let command = if pending.is_some() {
            tokio::select! {
                _ = stop.cancelled() => break,
                command = rx.recv() => command,
                _ = tokio::time::sleep(interval) => {
                    if let Some(snapshot) = pending.take() {
                        flush(&signaling, snapshot).await;
                    }
                    continue;
                }
            }
        } else {
            tokio::select! {
                _ = stop.cancelled() => break,
                command = rx.recv() => command,
            }
        };

        match command {
            Some(BroadcastCommand::Update(snapshot)) => pending = Some(snapshot),
            Some(BroadcastCommand::Discard(ack)) => {
                pending = None;
                let _ = ack.send(());
            }
            None => break,
        }
    }
}

async fn flush(signaling: &ScopedChannel, snapshot: WhiteboardSnapshot) {
    let elements = snapshot.elements.len();
    let data = match serde_json::to_value(&snapshot) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "Failed to encode whiteboard snapshot");
            return;
        }
    };
    match signaling.send(events::WHITEBOARD_UPDATE, data).await {
        Ok(()) => debug!(elements, "Whiteboard snapshot sent"),
        Err(e) => warn!(error = %e, "Failed to send whiteboard snapshot"),
    }
}
