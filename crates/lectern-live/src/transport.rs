//! Publish and subscribe transports.
//!
//! A [`Transport`] wraps the engine's local transport and walks it through
//! `Uninitialized -> Connecting -> Connected`, ending in `Failed` or
//! `Closed`. Both end states are terminal: the [`TransportManager`]
//! replaces a terminal transport instead of reviving it.

use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::device::Device;
use crate::error::{LiveError, Result};
use crate::media::{
    Direction, EngineTransport, IceState, MediaTrack, TransportDiagnostics, TransportPolicy,
};
use crate::protocol::{ClientSignal, ConsumerOptions, ServerSignal, TransportOptions};
use crate::session::SessionEvent;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Uninitialized,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl TransportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransportState::Failed | TransportState::Closed)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

struct TransportInner {
    direction: Direction,
    engine: Arc<dyn EngineTransport>,
    ctx: SessionContext,
    state_tx: watch::Sender<TransportState>,
    connect_lock: Mutex<()>,
    watcher_stop: CancellationToken,
}

/// One negotiated media pipe to the SFU.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    fn new(direction: Direction, engine: Arc<dyn EngineTransport>, ctx: SessionContext) -> Self {
        let (state_tx, _) = watch::channel(TransportState::Uninitialized);
        let watcher_stop = ctx.cancel.child_token();
        let transport = Self {
            inner: Arc::new(TransportInner {
                direction,
                engine,
                ctx,
                state_tx,
                connect_lock: Mutex::new(()),
                watcher_stop,
            }),
        };
        tokio::spawn(watch_ice(
            Arc::downgrade(&transport.inner),
            transport.inner.engine.ice_state(),
            transport.inner.watcher_stop.clone(),
        ));
        transport
    }

    pub fn id(&self) -> &str {
        self.inner.engine.id()
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    pub fn state(&self) -> TransportState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }

    pub fn diagnostics(&self) -> TransportDiagnostics {
        self.inner.engine.diagnostics()
    }

    /// Run the connect handshake. Runs at most once: concurrent callers
    /// wait for the first, later callers see `Connected` and return.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;
        let direction = self.inner.direction;
        match self.state() {
            TransportState::Connected => return Ok(()),
            state if state.is_terminal() => {
                return Err(LiveError::TransportConnectionFailed {
                    direction,
                    reason: format!("transport is {state:?}"),
                })
            }
            _ => {}
        }

        self.set_state(TransportState::Connecting);
        let dtls_parameters = self.inner.engine.dtls_parameters();
        let (signal, expected) = match direction {
            Direction::Publish => (
                ClientSignal::ConnectProducerTransport { dtls_parameters },
                "producerConnected",
            ),
            Direction::Subscribe => (
                ClientSignal::ConnectConsumerTransport { dtls_parameters },
                "subConnected",
            ),
        };

        let result = async {
            let answer = self.inner.ctx.signaling.request(&signal).await?;
            if answer.name() != expected {
                return Err(LiveError::Protocol(format!(
                    "expected {expected}, got {}",
                    answer.name()
                )));
            }
            self.inner.engine.complete_connect().await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                if self.state() == TransportState::Connecting {
                    self.set_state(TransportState::Connected);
                }
                if self.is_connected() {
                    info!(%direction, transport_id = %self.id(), "Transport connected");
                    Ok(())
                } else {
                    Err(LiveError::TransportConnectionFailed {
                        direction,
                        reason: format!("transport became {:?} while connecting", self.state()),
                    })
                }
            }
            Err(LiveError::Cancelled) => Err(LiveError::Cancelled),
            Err(e) => {
                let reason = e.to_string();
                self.fail(&reason);
                Err(LiveError::TransportConnectionFailed { direction, reason })
            }
        }
    }

    /// Ask the server to accept `track`, returning the producer id.
    pub(crate) async fn produce(&self, track: &MediaTrack) -> Result<String> {
        self.require_connected(Direction::Publish)?;
        let rtp_parameters = self.inner.engine.send_parameters(track).await?;
        let answer = self
            .inner
            .ctx
            .signaling
            .request(&ClientSignal::Produce {
                kind: track.kind(),
                rtp_parameters,
            })
            .await?;
        match answer {
            ServerSignal::Produced { data } if !data.id.is_empty() => Ok(data.id),
            ServerSignal::Produced { .. } => {
                Err(LiveError::Protocol("produced answer has no id".into()))
            }
            other => Err(LiveError::Protocol(format!(
                "expected produced, got {}",
                other.name()
            ))),
        }
    }

    /// Materialize a remote track over this transport.
    pub(crate) async fn receive(&self, options: &ConsumerOptions) -> Result<MediaTrack> {
        self.require_connected(Direction::Subscribe)?;
        Ok(self.inner.engine.receive(options).await?)
    }

    fn require_connected(&self, direction: Direction) -> Result<()> {
        if self.inner.direction != direction {
            return Err(LiveError::Protocol(format!(
                "{} transport cannot be used to {direction}",
                self.inner.direction
            )));
        }
        if !self.is_connected() {
            return Err(LiveError::TransportNotConnected(direction));
        }
        Ok(())
    }

    /// Close the transport. Idempotent.
    pub fn close(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.inner.watcher_stop.cancel();
        self.inner.engine.close();
        self.set_state(TransportState::Closed);
        debug!(direction = %self.inner.direction, transport_id = %self.id(), "Transport closed");
    }

    fn fail(&self, reason: &str) {
        if self.state().is_terminal() {
            return;
        }
        self.set_state(TransportState::Failed);
        let diagnostics = self.inner.engine.diagnostics();
        warn!(
            direction = %self.inner.direction,
            transport_id = %self.id(),
            reason,
            local_candidates = ?diagnostics.local_candidates,
            remote_candidates = ?diagnostics.remote_candidates,
            selected_pair = ?diagnostics.selected_pair,
            relayed = diagnostics.relayed,
            "Transport failed"
        );
        self.inner.ctx.emit(SessionEvent::TransportFailed {
            direction: self.inner.direction,
            diagnostics,
        });
    }

    fn set_state(&self, state: TransportState) {
        self.inner.state_tx.send_replace(state);
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.id())
            .field("direction", &self.inner.direction)
            .field("state", &self.state())
            .finish()
    }
}

/// Follow the engine's ICE state for the lifetime of a transport.
async fn watch_ice(
    transport: Weak<TransportInner>,
    mut ice: watch::Receiver<IceState>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            changed = ice.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        let state = *ice.borrow_and_update();
        let Some(inner) = transport.upgrade() else {
            return;
        };
        let transport = Transport { inner };
        match state {
            IceState::Failed => {
                transport.fail("ICE connectivity failed");
                return;
            }
            IceState::Closed => {
                transport.close();
                return;
            }
            IceState::Disconnected => {
                debug!(direction = %transport.direction(), "ICE disconnected, waiting for recovery");
            }
            other => {
                debug!(direction = %transport.direction(), ice_state = ?other, "ICE state changed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TransportManager
// ---------------------------------------------------------------------------

/// Creates and owns the session's publish and subscribe transports.
pub struct TransportManager {
    ctx: SessionContext,
    policy: TransportPolicy,
    publish: Mutex<Option<Transport>>,
    subscribe: Mutex<Option<Transport>>,
    create_lock: Mutex<()>,
}

impl TransportManager {
    pub(crate) fn new(ctx: SessionContext, policy: TransportPolicy) -> Self {
        Self {
            ctx,
            policy,
            publish: Mutex::new(None),
            subscribe: Mutex::new(None),
            create_lock: Mutex::new(()),
        }
    }

    fn slot(&self, direction: Direction) -> &Mutex<Option<Transport>> {
        match direction {
            Direction::Publish => &self.publish,
            Direction::Subscribe => &self.subscribe,
        }
    }

    /// Transport to send local tracks. Reuses a live one.
    pub async fn create_publish_transport(&self, device: &Device) -> Result<Transport> {
        let rtp_capabilities = device.rtp_capabilities()?.clone();
        self.create(
            Direction::Publish,
            ClientSignal::CreateProducerTransport {
                force_tcp: self.policy.force_tcp,
                rtp_capabilities,
            },
        )
        .await
    }

    /// Transport to receive remote tracks. Reuses a live one.
    pub async fn create_subscribe_transport(&self, device: &Device) -> Result<Transport> {
        device.rtp_capabilities()?;
        self.create(
            Direction::Subscribe,
            ClientSignal::CreateConsumerTransport {
                force_tcp: self.policy.force_tcp,
            },
        )
        .await
    }

    async fn create(&self, direction: Direction, signal: ClientSignal) -> Result<Transport> {
        let _creating = self.create_lock.lock().await;
        if let Some(existing) = self.get(direction).await {
            return Ok(existing);
        }

        let generation = self.ctx.generation.current();
        let answer = self.ctx.signaling.request(&signal).await?;
        let options: TransportOptions = match (direction, answer) {
            (Direction::Publish, ServerSignal::ProducerTransportCreated { data })
            | (Direction::Subscribe, ServerSignal::SubTransportCreated { data }) => data,
            (_, other) => {
                return Err(LiveError::Protocol(format!(
                    "unexpected answer to {}: {}",
                    signal.name(),
                    other.name()
                )))
            }
        };
        self.ctx.ensure_current(generation)?;

        let ice_policy = self.policy.ice_policy_for(direction);
        let engine_transport = self
            .ctx
            .engine
            .create_transport(direction, &options, ice_policy, &self.policy.ice_servers)
            .await?;

        if !self.ctx.is_current(generation) {
            engine_transport.close();
            return Err(LiveError::Cancelled);
        }

        let transport = Transport::new(direction, engine_transport, self.ctx.clone());
        info!(%direction, transport_id = %transport.id(), ?ice_policy, "Transport created");
        *self.slot(direction).lock().await = Some(transport.clone());
        Ok(transport)
    }

    /// The current non-terminal transport for `direction`, if any.
    pub async fn get(&self, direction: Direction) -> Option<Transport> {
        self.slot(direction)
            .lock()
            .await
            .as_ref()
            .filter(|t| !t.state().is_terminal())
            .cloned()
    }

    pub async fn publish_transport(&self) -> Option<Transport> {
        self.get(Direction::Publish).await
    }

    pub async fn subscribe_transport(&self) -> Option<Transport> {
        self.get(Direction::Subscribe).await
    }

    pub async fn close(&self, direction: Direction) {
        if let Some(transport) = self.slot(direction).lock().await.take() {
            transport.close();
        }
    }

    pub async fn close_all(&self) {
        self.close(Direction::Publish).await;
        self.close(Direction::Subscribe).await;
    }
}
