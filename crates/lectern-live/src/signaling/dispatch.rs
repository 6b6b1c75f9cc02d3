//! Routing of inbound frames to pending requests and event listeners.

use std::collections::HashMap;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use super::types::Scope;
use crate::protocol::Envelope;

/// Buffer size for each listener channel.
const LISTENER_BUFFER: usize = 256;

struct PendingRequest {
    scope: Scope,
    tx: oneshot::Sender<Envelope>,
}

struct Listener {
    scope: Scope,
    event: String,
    tx: mpsc::Sender<Envelope>,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Dispatch table shared by the connection loop and channel handles.
///
/// A frame whose `ref` matches a pending request completes that request
/// and nothing else. A frame with an unknown `ref` is a late answer to a
/// request that was cancelled or timed out, and is dropped. Frames
/// without a `ref` fan out to every listener for their event.
#[derive(Default)]
pub(crate) struct Dispatcher {
    pending: Mutex<HashMap<String, PendingRequest>>,
    listeners: Mutex<Vec<Listener>>,
}

impl Dispatcher {
    pub(crate) async fn register_pending(
        &self,
        msg_ref: String,
        scope: Scope,
        tx: oneshot::Sender<Envelope>,
    ) {
        self.pending
            .lock()
            .await
            .insert(msg_ref, PendingRequest { scope, tx });
    }

    pub(crate) async fn forget_pending(&self, msg_ref: &str) {
        self.pending.lock().await.remove(msg_ref);
    }

    pub(crate) async fn listen(&self, scope: Scope, event: &str) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        self.listeners.lock().await.push(Listener {
            scope,
            event: event.to_string(),
            tx,
        });
        rx
    }

    /// Route one inbound frame.
    ///
    /// Never waits on a listener: a listener whose buffer is full loses the
    /// frame, so one stalled consumer cannot hold up request answers.
    pub(crate) async fn dispatch(&self, envelope: Envelope) {
        if let Some(msg_ref) = envelope.msg_ref.as_deref() {
            let pending = self.pending.lock().await.remove(msg_ref);
            match pending {
                Some(request) => {
                    let _ = request.tx.send(envelope);
                }
                None => {
                    debug!(event = %envelope.event, msg_ref, "Dropping answer to a request nobody awaits");
                }
            }
            return;
        }

        let mut listeners = self.listeners.lock().await;
        let mut delivered = 0;
        let mut saw_closed = false;
        for listener in listeners.iter().filter(|l| l.event == envelope.event) {
            match listener.tx.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        event = %envelope.event,
                        scope = ?listener.scope,
                        "Listener is not keeping up, dropping frame"
                    );
                }
                Err(TrySendError::Closed(_)) => saw_closed = true,
            }
        }
        if saw_closed {
            listeners.retain(|l| !l.tx.is_closed());
        }
        if delivered == 0 && !saw_closed {
            debug!(event = %envelope.event, "No listener took inbound frame");
        }
    }

    /// Drop every listener and pending request owned by `scope`.
    /// Pending requests resolve with [`crate::LiveError::Cancelled`].
    pub(crate) async fn detach(&self, scope: Scope) -> (usize, usize) {
        let mut listeners = self.listeners.lock().await;
        let before = listeners.len();
        listeners.retain(|l| l.scope != scope);
        let removed_listeners = before - listeners.len();
        drop(listeners);

        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, p| p.scope != scope);
        (removed_listeners, before - pending.len())
    }

    /// Drop everything.
    pub(crate) async fn clear(&self) {
        self.listeners.lock().await.clear();
        self.pending.lock().await.clear();
    }

    /// Fail all in-flight requests, e.g. after the socket dropped.
    pub(crate) async fn cancel_pending(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        pending.clear();
        count
    }

    #[cfg(test)]
    pub(crate) async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn answer_goes_only_to_its_request() {
        let dispatcher = Dispatcher::default();
        let scope = Scope::next();
        let mut listener = dispatcher.listen(scope, "message").await;
        let (tx, rx) = oneshot::channel();
        dispatcher.register_pending("1".into(), scope, tx).await;

        dispatcher
            .dispatch(Envelope::new("message", json!({"type": "subConnected"})).with_ref("1"))
            .await;

        let answer = rx.await.unwrap();
        assert_eq!(answer.data["type"], "subConnected");
        assert!(listener.try_recv().is_err());
    }

    #[tokio::test]
    async fn stalled_listener_does_not_block_answers() {
        let dispatcher = Dispatcher::default();
        let scope = Scope::next();
        let mut stalled = dispatcher.listen(scope, "new-message").await;
        for i in 0..(LISTENER_BUFFER + 44) {
            dispatcher
                .dispatch(Envelope::new("new-message", json!(i)))
                .await;
        }

        let (tx, rx) = oneshot::channel();
        dispatcher.register_pending("7".into(), scope, tx).await;
        dispatcher
            .dispatch(Envelope::new("message", json!({"type": "subscribed"})).with_ref("7"))
            .await;
        assert_eq!(rx.await.unwrap().data["type"], "subscribed");

        // The buffer kept the oldest frames; the overflow was dropped.
        let mut received = 0;
        while stalled.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, LISTENER_BUFFER);
        assert_eq!(dispatcher.listener_count().await, 1);
    }

    #[tokio::test]
    async fn late_answer_is_dropped() {
        let dispatcher = Dispatcher::default();
        let mut listener = dispatcher.listen(Scope::next(), "message").await;

        dispatcher
            .dispatch(Envelope::new("message", json!({"type": "subscribed"})).with_ref("99"))
            .await;

        assert!(listener.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsolicited_frame_fans_out_by_event() {
        let dispatcher = Dispatcher::default();
        let mut a = dispatcher.listen(Scope::next(), "new-producer").await;
        let mut b = dispatcher.listen(Scope::next(), "new-producer").await;
        let mut other = dispatcher.listen(Scope::next(), "new-message").await;

        dispatcher
            .dispatch(Envelope::new("new-producer", json!(null)))
            .await;

        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn detach_removes_only_that_scope() {
        let dispatcher = Dispatcher::default();
        let mine = Scope::next();
        let theirs = Scope::next();
        let mut gone = dispatcher.listen(mine, "new-message").await;
        let _kept = dispatcher.listen(theirs, "new-message").await;
        let (tx, rx) = oneshot::channel();
        dispatcher.register_pending("5".into(), mine, tx).await;

        assert_eq!(dispatcher.detach(mine).await, (1, 1));
        assert_eq!(dispatcher.listener_count().await, 1);
        assert!(rx.await.is_err());
        assert!(gone.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_listeners_are_pruned() {
        let dispatcher = Dispatcher::default();
        let rx = dispatcher.listen(Scope::next(), "new-message").await;
        drop(rx);
        dispatcher
            .dispatch(Envelope::new("new-message", json!("hi")))
            .await;
        assert_eq!(dispatcher.listener_count().await, 0);
    }

    #[tokio::test]
    async fn cancel_pending_fails_waiters() {
        let dispatcher = Dispatcher::default();
        let (tx, rx) = oneshot::channel();
        dispatcher.register_pending("1".into(), Scope::next(), tx).await;
        assert_eq!(dispatcher.cancel_pending().await, 1);
        assert!(rx.await.is_err());
        assert_eq!(dispatcher.pending_count().await, 0);
    }
}
