//! Room sessions and the client that owns them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lectern_common::{RoomId, SessionId};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::auxiliary::AuxiliaryChannelMux;
use crate::config::LiveConfig;
use crate::consumer::ConsumerSession;
use crate::context::SessionContext;
use crate::error::{LiveError, Result};
use crate::media::{
    Direction, MediaEngine, MediaKind, MediaSink, MediaTrack, TransportDiagnostics,
};
use crate::producer::{Producer, ProducerSession};
use crate::signaling::{ConnectionStatus, SignalingChannel};
use crate::transport::TransportManager;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Teacher: publishes camera and microphone.
    Publisher,
    /// Student: receives the teacher's tracks.
    Subscriber,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Subscriber => write!(f, "subscriber"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Failed,
}

/// Notifications for the application driving a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StatusChanged(SessionStatus),
    ConsumerAdded {
        producer_id: String,
        kind: MediaKind,
    },
    SubscriptionFailed {
        producer_id: String,
        reason: String,
    },
    TransportFailed {
        direction: Direction,
        diagnostics: TransportDiagnostics,
    },
    NegotiationFailed(String),
    /// The signaling socket dropped. Requests in flight were cancelled.
    SignalingLost,
    /// The socket is back and the room was rejoined.
    SignalingRestored,
    /// The remote stream rendered its first frame.
    Playing,
}

// ---------------------------------------------------------------------------
// LiveClient
// ---------------------------------------------------------------------------

/// Entry point: owns the signaling channel and hands out sessions, at
/// most one at a time.
pub struct LiveClient {
    signaling: SignalingChannel,
    engine: Arc<dyn MediaEngine>,
    config: LiveConfig,
    active: Arc<AtomicBool>,
}

impl LiveClient {
    pub fn new(config: LiveConfig, engine: Arc<dyn MediaEngine>) -> Self {
        let signaling = SignalingChannel::new(config.signaling.clone());
        Self::with_channel(config, engine, signaling)
    }

    /// Build a client on an existing channel.
    pub fn with_channel(
        config: LiveConfig,
        engine: Arc<dyn MediaEngine>,
        signaling: SignalingChannel,
    ) -> Self {
        Self {
            signaling,
            engine,
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the signaling connection. Idempotent.
    pub fn connect(&self) {
        self.signaling.connect();
    }

    pub fn signaling(&self) -> &SignalingChannel {
        &self.signaling
    }

    pub fn has_active_session(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Join `room` in `role`. Fails with [`LiveError::SessionActive`]
    /// while another session from this client has not left.
    pub async fn join(
        &self,
        room: impl Into<RoomId>,
        role: Role,
    ) -> Result<(Session, mpsc::Receiver<SessionEvent>)> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LiveError::SessionActive);
        }

        let started = Session::start(
            &self.signaling,
            Arc::clone(&self.engine),
            &self.config,
            room.into(),
            role,
            Arc::clone(&self.active),
        )
        .await;
        if started.is_err() {
            self.active.store(false, Ordering::Release);
        }
        started
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One participation in a room. Leave it with [`Session::leave`].
pub struct Session {
    id: SessionId,
    room: RoomId,
    role: Role,
    ctx: SessionContext,
    transports: Arc<TransportManager>,
    producer: Option<ProducerSession>,
    consumer: Option<ConsumerSession>,
    aux: AuxiliaryChannelMux,
    slot: Arc<AtomicBool>,
    left: AtomicBool,
}

impl Session {
    async fn start(
        signaling: &SignalingChannel,
        engine: Arc<dyn MediaEngine>,
        config: &LiveConfig,
        room: RoomId,
        role: Role,
        slot: Arc<AtomicBool>,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        let scoped = signaling.scoped();
        let (ctx, events) = SessionContext::new(scoped.clone(), engine);
        let transports = Arc::new(TransportManager::new(
            ctx.clone(),
            config.transport.clone(),
        ));
        let connection = scoped.connection_status()?;
        let aux = AuxiliaryChannelMux::new(scoped, config.auxiliary.clone());

        let (producer, consumer) = match role {
            Role::Publisher => (
                Some(ProducerSession::new(ctx.clone(), Arc::clone(&transports))),
                None,
            ),
            Role::Subscriber => {
                let consumer = ConsumerSession::new(ctx.clone(), Arc::clone(&transports));
                consumer.start().await?;
                (None, Some(consumer))
            }
        };

        let session = Self {
            id: SessionId::new(),
            room,
            role,
            ctx,
            transports,
            producer,
            consumer,
            aux,
            slot,
            left: AtomicBool::new(false),
        };
        session.aux.join_room(&session.room).await?;
        tokio::spawn(follow_signaling(session.ctx.clone(), connection));
        info!(session_id = %session.id, room = %session.room, role = %role, "Session started");
        Ok((session, events))
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.ctx.status()
    }

    pub fn current_status(&self) -> SessionStatus {
        self.ctx.current_status()
    }

    pub fn producer(&self) -> Option<&ProducerSession> {
        self.producer.as_ref()
    }

    pub fn consumer(&self) -> Option<&ConsumerSession> {
        self.consumer.as_ref()
    }

    pub fn transports(&self) -> &TransportManager {
        &self.transports
    }

    /// Chat and whiteboard for this session's room.
    pub fn aux(&self) -> &AuxiliaryChannelMux {
        &self.aux
    }

    /// Negotiate a publish transport and produce `tracks` on it.
    pub async fn publish(&self, tracks: Vec<MediaTrack>) -> Result<Vec<Producer>> {
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| LiveError::Protocol("publishing requires the publisher role".into()))?;

        self.ctx.set_status(SessionStatus::Connecting);
        let result = async {
            let device = self.ctx.ensure_device().await?;
            let transport = self.transports.create_publish_transport(&device).await?;
            transport.connect().await?;
            producer.start_publishing(tracks).await
        }
        .await;

        match &result {
            Ok(producers) => {
                info!(count = producers.len(), "Publishing");
                self.ctx.set_status(SessionStatus::Connected);
            }
            Err(LiveError::Cancelled) => {}
            Err(e) => {
                warn!(error = %e, "Publishing failed");
                self.ctx.set_status(SessionStatus::Failed);
                self.ctx
                    .emit(SessionEvent::NegotiationFailed(e.to_string()));
            }
        }
        result
    }

    pub async fn toggle_camera(&self, enabled: bool) {
        if let Some(producer) = &self.producer {
            producer.toggle_camera(enabled).await;
        }
    }

    pub async fn toggle_mic(&self, enabled: bool) {
        if let Some(producer) = &self.producer {
            producer.toggle_mic(enabled).await;
        }
    }

    /// Attach the sink that renders the teacher's stream.
    pub async fn attach_sink(&self, sink: Arc<dyn MediaSink>) -> Result<()> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| LiveError::Protocol("only subscribers render remote media".into()))?;
        consumer.set_sink(sink).await;
        Ok(())
    }

    /// Tear the session down and free the client for another join.
    pub async fn leave(self) {
        self.teardown().await;
    }

    async fn teardown(&self) {
        if self.left.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(session_id = %self.id, room = %self.room, "Leaving session");

        self.ctx.invalidate();
        if let Some(producer) = &self.producer {
            producer.stop_publishing().await;
        }
        match &self.consumer {
            Some(consumer) => consumer.leave_room().await,
            None => self.ctx.signaling.reset().await,
        }
        self.transports.close_all().await;
        self.aux.shutdown();
        self.ctx.set_status(SessionStatus::Idle);
        self.slot.store(false, Ordering::Release);
    }
}

/// Mirror socket loss into the session status until the session ends.
async fn follow_signaling(ctx: SessionContext, mut connection: watch::Receiver<ConnectionStatus>) {
    let mut before_loss: Option<SessionStatus> = None;
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            changed = connection.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        let status = *connection.borrow_and_update();
        match (status, before_loss) {
            (ConnectionStatus::Disconnected, None) => {
                warn!("Signaling lost");
                before_loss = Some(ctx.current_status());
                ctx.set_status(SessionStatus::Failed);
                ctx.emit(SessionEvent::SignalingLost);
            }
            (ConnectionStatus::Connected, Some(previous)) => {
                info!("Signaling restored");
                before_loss = None;
                // A negotiation that was cut off stays failed.
                if ctx.current_status() == SessionStatus::Failed
                    && previous != SessionStatus::Connecting
                {
                    ctx.set_status(previous);
                }
                ctx.emit(SessionEvent::SignalingRestored);
            }
            _ => {}
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.left.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(session_id = %self.id, "Session dropped without leaving");
        self.ctx.invalidate();
        self.aux.shutdown();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let signaling = self.ctx.signaling.clone();
            let transports = Arc::clone(&self.transports);
            runtime.spawn(async move {
                signaling.detach().await;
                transports.close_all().await;
            });
        }
        self.slot.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests;
