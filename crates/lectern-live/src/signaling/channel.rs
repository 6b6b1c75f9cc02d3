//! Public handles for the signaling connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::connection::{connection_loop, next_ref};
use super::dispatch::Dispatcher;
use super::types::{ConnectionStatus, Scope, SignalingConfig};
use crate::error::{LiveError, Result};
use crate::protocol::{events, ClientSignal, Envelope, ServerSignal};

/// Outbound queue size.
const OUTBOUND_BUFFER: usize = 256;

pub(crate) struct Inner {
    pub(crate) config: SignalingConfig,
    pub(crate) outbound_tx: mpsc::Sender<Envelope>,
    pub(crate) outbound_rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    pub(crate) dispatcher: Dispatcher,
    /// Frames replayed on every reconnect, e.g. room joins.
    pub(crate) rejoin: Mutex<Vec<(Scope, Envelope)>>,
    pub(crate) status_tx: watch::Sender<ConnectionStatus>,
    pub(crate) started: AtomicBool,
    pub(crate) shutdown: CancellationToken,
}

impl Inner {
    pub(crate) async fn rejoin_frames(&self) -> Vec<Envelope> {
        self.rejoin
            .lock()
            .await
            .iter()
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SignalingChannel
// ---------------------------------------------------------------------------

/// Handle to the signaling socket. Cheap to clone; all clones share one
/// connection and one dispatch table.
#[derive(Clone)]
pub struct SignalingChannel {
    inner: Arc<Inner>,
}

impl SignalingChannel {
    /// Create a channel. Nothing is dialed until [`connect`](Self::connect).
    pub fn new(config: SignalingConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                outbound_tx,
                outbound_rx: Arc::new(Mutex::new(outbound_rx)),
                dispatcher: Dispatcher::default(),
                rejoin: Mutex::new(Vec::new()),
                status_tx,
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Start the background connection. Calling it again is a no-op, so
    /// there is never more than one socket per channel.
    pub fn connect(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            debug!("Signaling connection already started");
            return;
        }
        tokio::spawn(connection_loop(Arc::clone(&self.inner)));
    }

    /// Close the socket and stop reconnecting.
    pub fn disconnect(&self) {
        info!("Disconnecting signaling channel");
        self.inner.shutdown.cancel();
    }

    pub fn config(&self) -> &SignalingConfig {
        &self.inner.config
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.status_tx.borrow() == ConnectionStatus::Connected
    }

    /// Wait until the socket is up, or fail after `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut status = self.status();
        let wait = status.wait_for(|s| *s == ConnectionStatus::Connected);
        let result = tokio::time::timeout(timeout, wait)
            .await
            .map(|r| r.map(|_| ()));
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LiveError::Signaling("signaling channel closed".into())),
            Err(_) => Err(LiveError::Timeout {
                event: "connect".into(),
                after: timeout,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakSignaling {
        WeakSignaling {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Handle whose listeners and requests all belong to a fresh scope.
    pub fn scoped(&self) -> ScopedChannel {
        ScopedChannel {
            channel: self.downgrade(),
            scope: Scope::next(),
        }
    }

    /// Queue a fire-and-forget frame.
    pub async fn send(&self, event: &str, data: Value) -> Result<()> {
        self.send_envelope(Envelope::new(event, data)).await
    }

    /// Queue a frame that is sent again after every reconnect until
    /// `scope` detaches. The server forgets room membership with the socket.
    pub async fn send_sticky(&self, scope: Scope, event: &str, data: Value) -> Result<()> {
        let envelope = Envelope::new(event, data);
        self.inner.rejoin.lock().await.push((scope, envelope.clone()));
        self.send_envelope(envelope).await
    }

    async fn send_envelope(&self, envelope: Envelope) -> Result<()> {
        self.inner
            .outbound_tx
            .send(envelope)
            .await
            .map_err(|_| LiveError::Signaling("outbound queue closed".into()))
    }

    /// Send a frame with a fresh `ref` and wait for the frame answering it.
    async fn call(
        &self,
        scope: Scope,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Envelope> {
        let msg_ref = next_ref();
        let (tx, rx) = oneshot::channel();
        self.inner
            .dispatcher
            .register_pending(msg_ref.clone(), scope, tx)
            .await;

        if let Err(e) = self
            .send_envelope(Envelope::new(event, data).with_ref(msg_ref.clone()))
            .await
        {
            self.inner.dispatcher.forget_pending(&msg_ref).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(LiveError::Cancelled),
            Err(_) => {
                self.inner.dispatcher.forget_pending(&msg_ref).await;
                Err(LiveError::Timeout {
                    event: event.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Send a negotiation request and wait for its typed answer.
    ///
    /// Concurrent requests of the same type are kept apart by `ref`.
    pub async fn request(&self, scope: Scope, signal: &ClientSignal) -> Result<ServerSignal> {
        let data = serde_json::to_value(signal)?;
        let timeout = self.inner.config.request_timeout;
        debug!(request = signal.name(), "Sending negotiation request");
        let envelope = self
            .call(scope, events::MESSAGE, data, timeout)
            .await
            .map_err(|e| match e {
                LiveError::Timeout { after, .. } => LiveError::Timeout {
                    event: signal.name().to_string(),
                    after,
                },
                other => other,
            })?;
        Ok(serde_json::from_value(envelope.data)?)
    }

    /// Send an event that the server acknowledges, returning the ack payload.
    pub async fn ack_request(
        &self,
        scope: Scope,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value> {
        Ok(self.call(scope, event, data, timeout).await?.data)
    }

    /// Subscribe to server-initiated frames for `event`.
    pub async fn listen(&self, scope: Scope, event: &str) -> mpsc::Receiver<Envelope> {
        self.inner.dispatcher.listen(scope, event).await
    }

    /// Remove all listeners and fail all pending requests of `scope`.
    pub async fn detach(&self, scope: Scope) {
        let (listeners, pending) = self.inner.dispatcher.detach(scope).await;
        self.inner.rejoin.lock().await.retain(|(s, _)| *s != scope);
        debug!(?scope, listeners, pending, "Detached signaling scope");
    }

    /// Drop every listener and pending request, leaving only the base
    /// request/answer routing in place.
    pub async fn reset(&self) {
        self.inner.dispatcher.clear().await;
        self.inner.rejoin.lock().await.clear();
        debug!("Signaling dispatch table reset");
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }
}

impl std::fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("config", &self.inner.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WeakSignaling
// ---------------------------------------------------------------------------

/// Non-owning reference to a channel. Sessions hold this so the channel
/// can be dropped independently of any session.
#[derive(Clone)]
pub struct WeakSignaling {
    inner: Weak<Inner>,
}

impl WeakSignaling {
    pub fn upgrade(&self) -> Option<SignalingChannel> {
        self.inner.upgrade().map(|inner| SignalingChannel { inner })
    }
}

// ---------------------------------------------------------------------------
// ScopedChannel
// ---------------------------------------------------------------------------

/// A [`SignalingChannel`] view bound to one [`Scope`].
#[derive(Clone)]
pub struct ScopedChannel {
    channel: WeakSignaling,
    scope: Scope,
}

impl ScopedChannel {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    fn channel(&self) -> Result<SignalingChannel> {
        self.channel
            .upgrade()
            .ok_or_else(|| LiveError::Signaling("signaling channel dropped".into()))
    }

    pub async fn send(&self, event: &str, data: Value) -> Result<()> {
        self.channel()?.send(event, data).await
    }

    /// See [`SignalingChannel::send_sticky`].
    pub async fn send_sticky(&self, event: &str, data: Value) -> Result<()> {
        self.channel()?.send_sticky(self.scope, event, data).await
    }

    pub fn connection_status(&self) -> Result<watch::Receiver<ConnectionStatus>> {
        Ok(self.channel()?.status())
    }

    pub async fn request(&self, signal: &ClientSignal) -> Result<ServerSignal> {
        self.channel()?.request(self.scope, signal).await
    }

    pub async fn ack_request(&self, event: &str, data: Value, timeout: Duration) -> Result<Value> {
        self.channel()?
            .ack_request(self.scope, event, data, timeout)
            .await
    }

    pub async fn listen(&self, event: &str) -> Result<mpsc::Receiver<Envelope>> {
        Ok(self.channel()?.listen(self.scope, event).await)
    }

    pub async fn detach(&self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.detach(self.scope).await;
        }
    }

    /// Detach this scope, then reset the whole dispatch table.
    pub async fn reset(&self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.detach(self.scope).await;
            channel.reset().await;
        }
    }
}
