//! Receiving the teacher's tracks.
//!
//! A `new-producer` notification starts one negotiation: router
//! capabilities, device load, subscribe transport, `consume`. Each
//! `subscribed` answer materializes one consumer. The subscribe transport
//! connects lazily on the first answer, and a fresh `consume` follows the
//! connect so producers announced meanwhile are picked up. That follow-up
//! usually re-delivers producers already consumed, so consumers are
//! deduplicated by producer id.
//!
//! If the subscribe transport fails, everything received on it is dropped
//! and the subscriber negotiates again on a fresh transport.
//!
//! Every async step checks the session generation when it resumes; work
//! that finishes after [`ConsumerSession::leave_room`] is discarded.

mod attachment;

pub use attachment::{PlaybackState, StreamAttachment};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::error::{LiveError, Result};
use crate::media::{Direction, MediaKind, MediaSink, MediaTrack};
use crate::protocol::{events, ClientSignal, Envelope, ServerSignal, SubscribedPayload};
use crate::session::{SessionEvent, SessionStatus};
use crate::transport::{Transport, TransportManager, TransportState};

/// Negotiation progress of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Negotiating,
    Consuming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Track received, server-side consumer still paused.
    Created,
    Running,
    Closed,
}

/// A remote track being received.
#[derive(Debug, Clone)]
pub struct Consumer {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub track: MediaTrack,
    pub state: ConsumerState,
}

/// Work the session queues for its own event pump.
enum FollowUp {
    Subscribed(SubscribedPayload),
    Renegotiate,
}

struct ConsumerTable {
    state: NegotiationState,
    /// Keyed by producer id.
    consumers: HashMap<String, Consumer>,
    /// Producer ids whose `subscribed` answer is being processed.
    in_flight: HashSet<String>,
    /// Id of the subscribe transport whose failure we are watching.
    watched: Option<String>,
}

/// Subscriber side of a session. Clones share state.
#[derive(Clone)]
pub struct ConsumerSession {
    ctx: SessionContext,
    transports: Arc<TransportManager>,
    table: Arc<Mutex<ConsumerTable>>,
    attachment: Arc<StreamAttachment>,
    follow_up_tx: mpsc::UnboundedSender<FollowUp>,
    follow_up_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<FollowUp>>>>,
}

impl ConsumerSession {
    pub(crate) fn new(ctx: SessionContext, transports: Arc<TransportManager>) -> Self {
        let (follow_up_tx, follow_up_rx) = mpsc::unbounded_channel();
        Self {
            attachment: Arc::new(StreamAttachment::new(ctx.clone())),
            ctx,
            transports,
            table: Arc::new(Mutex::new(ConsumerTable {
                state: NegotiationState::Idle,
                consumers: HashMap::new(),
                in_flight: HashSet::new(),
                watched: None,
            })),
            follow_up_tx,
            follow_up_rx: Arc::new(Mutex::new(Some(follow_up_rx))),
        }
    }

    /// Register for `new-producer` and unsolicited `subscribed` frames and
    /// start processing them in the background.
    pub(crate) async fn start(&self) -> Result<()> {
        let new_producer = self.ctx.signaling.listen(events::NEW_PRODUCER).await?;
        let messages = self.ctx.signaling.listen(events::MESSAGE).await?;
        let follow_ups = self
            .follow_up_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| LiveError::Protocol("consumer session already started".into()))?;
        tokio::spawn(self.clone().pump(new_producer, messages, follow_ups));
        Ok(())
    }

    async fn pump(
        self,
        mut new_producer: mpsc::Receiver<Envelope>,
        mut messages: mpsc::Receiver<Envelope>,
        mut follow_ups: mpsc::UnboundedReceiver<FollowUp>,
    ) {
        loop {
            tokio::select! {
                _ = self.ctx.cancel.cancelled() => break,
                frame = new_producer.recv() => {
                    if frame.is_none() {
                        break;
                    }
                    self.spawn_negotiation();
                }
                frame = messages.recv() => {
                    let Some(frame) = frame else { break };
                    match serde_json::from_value::<ServerSignal>(frame.data) {
                        Ok(ServerSignal::Subscribed { data }) => self.spawn_on_subscribed(data),
                        Ok(other) => debug!(signal = other.name(), "Ignoring unsolicited signal"),
                        Err(e) => debug!(error = %e, "Unparseable message frame"),
                    }
                }
                Some(follow_up) = follow_ups.recv() => match follow_up {
                    FollowUp::Subscribed(payload) => self.spawn_on_subscribed(payload),
                    FollowUp::Renegotiate => self.spawn_negotiation(),
                },
            }
        }
        debug!("Consumer event pump stopped");
    }

    fn spawn_negotiation(&self) {
        let session = self.clone();
        tokio::spawn(async move {
            if let Err(e) = session.handle_new_producer().await {
                warn!(error = %e, "Negotiation for new producer failed");
            }
        });
    }

    fn spawn_on_subscribed(&self, payload: SubscribedPayload) {
        let session = self.clone();
        tokio::spawn(async move {
            if let Err(e) = session.on_subscribed(payload).await {
                debug!(error = %e, "Subscribed answer not applied");
            }
        });
    }

    pub fn attachment(&self) -> &StreamAttachment {
        &self.attachment
    }

    pub async fn set_sink(&self, sink: Arc<dyn MediaSink>) {
        self.attachment.set_sink(sink).await;
    }

    pub async fn state(&self) -> NegotiationState {
        self.table.lock().await.state
    }

    pub async fn consumers(&self) -> Vec<Consumer> {
        self.table.lock().await.consumers.values().cloned().collect()
    }

    pub async fn consumer(&self, producer_id: &str) -> Option<Consumer> {
        self.table.lock().await.consumers.get(producer_id).cloned()
    }

    /// React to a `new-producer` notification.
    ///
    /// Returns `Ok(false)` when a negotiation is already running or done;
    /// only an idle session starts one.
    pub async fn handle_new_producer(&self) -> Result<bool> {
        let generation = self.ctx.generation.current();
        if !self.ctx.is_current(generation) {
            return Ok(false);
        }
        {
            let mut table = self.table.lock().await;
            if table.state != NegotiationState::Idle {
                debug!(state = ?table.state, "Negotiation already underway, ignoring new producer");
                return Ok(false);
            }
            table.state = NegotiationState::Negotiating;
        }
        info!("New producer announced, negotiating");
        self.ctx.set_status(SessionStatus::Connecting);

        match self.negotiate(generation).await {
            Ok(()) => Ok(true),
            Err(e) => {
                // Stale work must not touch the state of a torn-down session.
                if self.ctx.is_current(generation) {
                    let mut table = self.table.lock().await;
                    if table.consumers.is_empty() {
                        table.state = NegotiationState::Idle;
                    }
                    drop(table);
                    if !matches!(e, LiveError::Subscription { .. }) {
                        self.ctx.set_status(SessionStatus::Failed);
                        self.ctx
                            .emit(SessionEvent::NegotiationFailed(e.to_string()));
                    }
                }
                Err(e)
            }
        }
    }

    async fn negotiate(&self, generation: u64) -> Result<()> {
        let device = self.ctx.ensure_device().await?;
        self.ctx.ensure_current(generation)?;

        let transport = self.transports.create_subscribe_transport(&device).await?;
        self.ctx.ensure_current(generation)?;
        debug!(transport_id = %transport.id(), "Subscribe transport ready");

        let rtp_capabilities = device.rtp_capabilities()?.clone();
        let answer = self
            .ctx
            .signaling
            .request(&ClientSignal::Consume { rtp_capabilities })
            .await?;
        self.ctx.ensure_current(generation)?;

        match answer {
            ServerSignal::Subscribed { data } => self.on_subscribed(data).await.map(|_| ()),
            other => Err(LiveError::Protocol(format!(
                "expected subscribed, got {}",
                other.name()
            ))),
        }
    }

    /// Apply one `subscribed` answer. A producer that already has (or is
    /// getting) a consumer is ignored and `Ok(false)` is returned.
    pub async fn on_subscribed(&self, payload: SubscribedPayload) -> Result<bool> {
        let generation = self.ctx.generation.current();
        if !self.ctx.is_current(generation) {
            debug!("Ignoring subscribed answer for a closed session");
            return Ok(false);
        }

        let requested = payload.producer_id.clone();
        let options = payload.into_options().map_err(|reason| {
            warn!(producer_id = %requested, %reason, "Subscription failed");
            self.ctx.emit(SessionEvent::SubscriptionFailed {
                producer_id: requested.clone(),
                reason: reason.clone(),
            });
            LiveError::Subscription {
                producer_id: requested.clone(),
                reason,
            }
        })?;
        let producer_id = options.producer_id.clone();

        {
            let mut table = self.table.lock().await;
            if table.consumers.contains_key(&producer_id)
                || !table.in_flight.insert(producer_id.clone())
            {
                debug!(%producer_id, "Already consuming producer, dropping duplicate");
                return Ok(false);
            }
        }

        let result = self.materialize(options, generation).await;
        self.table.lock().await.in_flight.remove(&producer_id);
        result.map(|()| true)
    }

    async fn materialize(
        &self,
        options: crate::protocol::ConsumerOptions,
        generation: u64,
    ) -> Result<()> {
        let transport = self
            .transports
            .subscribe_transport()
            .await
            .ok_or(LiveError::TransportNotConnected(Direction::Subscribe))?;
        self.watch_transport(&transport, generation).await;

        let was_connected = transport.is_connected();
        transport.connect().await?;
        self.ctx.ensure_current(generation)?;
        if !was_connected {
            self.request_follow_up_consume();
        }

        let track = transport.receive(&options).await?;
        if !self.ctx.is_current(generation) {
            track.stop();
            return Err(LiveError::Cancelled);
        }

        let consumer = Consumer {
            id: options.id.clone(),
            producer_id: options.producer_id.clone(),
            kind: options.kind,
            track: track.clone(),
            state: ConsumerState::Created,
        };
        {
            let mut table = self.table.lock().await;
            table.consumers.insert(options.producer_id.clone(), consumer);
            table.state = NegotiationState::Consuming;
        }
        self.attachment.add_track(track).await;
        info!(
            consumer_id = %options.id,
            producer_id = %options.producer_id,
            kind = %options.kind,
            "Consumer created"
        );
        self.ctx.set_status(SessionStatus::Connected);
        self.ctx.emit(SessionEvent::ConsumerAdded {
            producer_id: options.producer_id.clone(),
            kind: options.kind,
        });

        match self.ctx.signaling.request(&ClientSignal::Resume).await {
            Ok(_) if self.ctx.is_current(generation) => {
                if let Some(c) = self
                    .table
                    .lock()
                    .await
                    .consumers
                    .get_mut(&options.producer_id)
                {
                    c.state = ConsumerState::Running;
                }
                debug!(producer_id = %options.producer_id, "Consumer resumed");
            }
            Ok(_) => {}
            // The track may already be flowing.
            Err(e) => warn!(error = %e, producer_id = %options.producer_id, "Resume failed"),
        }
        Ok(())
    }

    /// After the subscribe transport connects, ask again so producers that
    /// appeared during the handshake are consumed too.
    fn request_follow_up_consume(&self) {
        let session = self.clone();
        tokio::spawn(async move {
            let generation = session.ctx.generation.current();
            let Some(device) = session.ctx.device().await else {
                return;
            };
            let Ok(rtp_capabilities) = device.rtp_capabilities().cloned() else {
                return;
            };
            match session
                .ctx
                .signaling
                .request(&ClientSignal::Consume { rtp_capabilities })
                .await
            {
                Ok(ServerSignal::Subscribed { data }) if session.ctx.is_current(generation) => {
                    let _ = session.follow_up_tx.send(FollowUp::Subscribed(data));
                }
                Ok(other) => debug!(signal = other.name(), "Follow-up consume not applied"),
                Err(e) => debug!(error = %e, "Follow-up consume failed"),
            }
        });
    }

    async fn watch_transport(&self, transport: &Transport, generation: u64) {
        {
            let mut table = self.table.lock().await;
            if table.watched.as_deref() == Some(transport.id()) {
                return;
            }
            table.watched = Some(transport.id().to_string());
        }

        let session = self.clone();
        let transport_id = transport.id().to_string();
        let mut state = transport.watch_state();
        tokio::spawn(async move {
            let terminal = async {
                state
                    .wait_for(|s| s.is_terminal())
                    .await
                    .map(|s| *s == TransportState::Failed)
                    .unwrap_or(false)
            };
            let failed = tokio::select! {
                _ = session.ctx.cancel.cancelled() => return,
                failed = terminal => failed,
            };
            if failed && session.ctx.is_current(generation) {
                session.recover(&transport_id).await;
            }
        });
    }

    /// Drop every consumer of the failed transport `transport_id` and queue
    /// a fresh negotiation.
    async fn recover(&self, transport_id: &str) {
        {
            let mut table = self.table.lock().await;
            if table.watched.as_deref() != Some(transport_id) {
                return;
            }
            table.watched = None;
            for consumer in table.consumers.values_mut() {
                consumer.state = ConsumerState::Closed;
                consumer.track.stop();
            }
            let dropped = table.consumers.len();
            table.consumers.clear();
            table.in_flight.clear();
            table.state = NegotiationState::Idle;
            warn!(%transport_id, dropped, "Subscribe transport failed, renegotiating");
        }
        self.attachment.reset_stream().await;
        self.transports.close(Direction::Subscribe).await;
        self.ctx.set_status(SessionStatus::Failed);
        let _ = self.follow_up_tx.send(FollowUp::Renegotiate);
    }

    /// Tear down everything this subscriber owns: tracks, consumers, the
    /// subscribe transport and its signaling handlers. Completes without
    /// waiting on the network; late answers are discarded.
    pub async fn leave_room(&self) {
        self.ctx.invalidate();
        self.ctx.signaling.reset().await;

        self.attachment.clear().await;
        self.transports.close(Direction::Subscribe).await;

        let mut table = self.table.lock().await;
        for consumer in table.consumers.values_mut() {
            consumer.state = ConsumerState::Closed;
            consumer.track.stop();
        }
        table.consumers.clear();
        table.in_flight.clear();
        table.watched = None;
        table.state = NegotiationState::Idle;
        drop(table);

        self.ctx.set_status(SessionStatus::Idle);
        info!("Left room as subscriber");
    }
}
