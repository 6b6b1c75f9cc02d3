//! In-process doubles for the signaling server and the media stack.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Notify};

use crate::media::{
    Direction, EngineError, EngineTransport, IceServer, IceState, IceTransportPolicy,
    MediaEngine, MediaKind, MediaSink, MediaStream, MediaTrack, TransportDiagnostics,
};
use crate::protocol::{
    ClientSignal, ConsumerOptions, DtlsParameters, Envelope, RouterCapabilities,
    RtpCapabilities, RtpParameters, ServerSignal, SubscribedPayload, TransportOptions,
};
use crate::context::SessionContext;
use crate::device::Device;
use crate::session::SessionEvent;
use crate::signaling::{ConnectionStatus, Inner, SignalingChannel, SignalingConfig};

// ---------------------------------------------------------------------------
// Loopback signaling server
// ---------------------------------------------------------------------------

/// Test side of a channel with no socket: reads what the client queued
/// and injects frames straight into its dispatcher.
pub(crate) struct LoopbackServer {
    inner: Arc<Inner>,
}

pub(crate) fn loopback_channel() -> (SignalingChannel, LoopbackServer) {
    let channel = SignalingChannel::new(SignalingConfig {
        url: "ws://loopback.invalid/ws".into(),
        request_timeout: Duration::from_millis(300),
        ..Default::default()
    });
    let inner = Arc::clone(channel.inner());
    inner.started.store(true, Ordering::Release);
    inner.status_tx.send_replace(ConnectionStatus::Connected);
    (channel, LoopbackServer { inner })
}

impl LoopbackServer {
    pub(crate) async fn next_frame(&self) -> Envelope {
        let mut rx = self.inner.outbound_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("outbound queue closed")
    }

    pub(crate) async fn try_next_frame(&self) -> Option<Envelope> {
        self.inner.outbound_rx.lock().await.try_recv().ok()
    }

    pub(crate) async fn expect_signal(&self) -> (ClientSignal, Envelope) {
        let frame = self.next_frame().await;
        assert_eq!(frame.event, "message", "expected a negotiation frame");
        let signal = serde_json::from_value(frame.data.clone()).expect("valid client signal");
        (signal, frame)
    }

    pub(crate) async fn reply(&self, request: &Envelope, signal: ServerSignal) {
        let data = serde_json::to_value(signal).expect("serializable signal");
        self.answer(request, data).await;
    }

    pub(crate) async fn answer(&self, request: &Envelope, data: Value) {
        self.inner
            .dispatcher
            .dispatch(Envelope {
                event: request.event.clone(),
                data,
                msg_ref: request.msg_ref.clone(),
            })
            .await;
    }

    /// Flip the socket state the way the connection loop does.
    pub(crate) fn set_connection(&self, status: ConnectionStatus) {
        self.inner.status_tx.send_replace(status);
    }

    /// Frames the connection loop would replay on a new socket.
    pub(crate) async fn rejoin_frames(&self) -> Vec<Envelope> {
        self.inner.rejoin_frames().await
    }

    pub(crate) async fn push(&self, event: &str, data: Value) {
        self.inner.dispatcher.dispatch(Envelope::new(event, data)).await;
    }
}

/// Give spawned tasks time to run.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub(crate) fn test_context(
    channel: &SignalingChannel,
    engine: Arc<dyn MediaEngine>,
) -> (SessionContext, mpsc::Receiver<SessionEvent>) {
    SessionContext::new(channel.scoped(), engine)
}

pub(crate) fn loaded_device() -> Device {
    Device::loaded(
        RouterCapabilities(json!({"codecs": []})),
        RtpCapabilities(json!({"codecs": ["opus", "vp8"]})),
    )
}

// ---------------------------------------------------------------------------
// Canned payloads
// ---------------------------------------------------------------------------

pub(crate) fn router_caps() -> ServerSignal {
    ServerSignal::RouterCapabilities {
        data: RouterCapabilities(json!({"codecs": [{"mimeType": "audio/opus"}]})),
    }
}

pub(crate) fn transport_created(direction: Direction, id: &str) -> ServerSignal {
    let data = TransportOptions {
        id: id.to_string(),
        ice_parameters: json!({"usernameFragment": "u", "password": "p"}),
        ice_candidates: json!([]),
        dtls_parameters: json!({"role": "auto"}),
        sctp_parameters: None,
    };
    match direction {
        Direction::Publish => ServerSignal::ProducerTransportCreated { data },
        Direction::Subscribe => ServerSignal::SubTransportCreated { data },
    }
}

pub(crate) fn subscribed(producer_id: &str, kind: MediaKind) -> ServerSignal {
    ServerSignal::Subscribed {
        data: subscribed_payload(producer_id, kind),
    }
}

pub(crate) fn subscribed_payload(producer_id: &str, kind: MediaKind) -> SubscribedPayload {
    SubscribedPayload {
        id: format!("consumer-{producer_id}"),
        producer_id: producer_id.to_string(),
        kind: Some(kind),
        rtp_parameters: RtpParameters(json!({"codecs": []})),
        error: None,
    }
}

// ---------------------------------------------------------------------------
// Fake media engine
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeEngine {
    reject_load: bool,
    load_gate: Option<Arc<Notify>>,
    load_attempts: AtomicUsize,
    loads: AtomicUsize,
    transports: Mutex<Vec<Arc<FakeTransport>>>,
}

impl FakeEngine {
    pub(crate) fn rejecting_load() -> Self {
        Self {
            reject_load: true,
            ..Default::default()
        }
    }

    /// Engine whose `load` blocks until `gate` is notified.
    pub(crate) fn gated(gate: Arc<Notify>) -> Self {
        Self {
            load_gate: Some(gate),
            ..Default::default()
        }
    }

    pub(crate) fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn transports(&self) -> Vec<Arc<FakeTransport>> {
        self.transports.lock().unwrap().clone()
    }

    pub(crate) fn last_transport(&self, direction: Direction) -> Option<Arc<FakeTransport>> {
        self.transports()
            .into_iter()
            .rev()
            .find(|t| t.direction == direction)
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn load(&self, _router: &RouterCapabilities) -> Result<RtpCapabilities, EngineError> {
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.load_gate {
            gate.notified().await;
        }
        if self.reject_load {
            return Err(EngineError::new("unsupported router codecs"));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(RtpCapabilities(json!({"codecs": ["opus", "vp8"]})))
    }

    async fn create_transport(
        &self,
        direction: Direction,
        options: &TransportOptions,
        ice_policy: IceTransportPolicy,
        _ice_servers: &[IceServer],
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        let transport = Arc::new(FakeTransport::new(direction, &options.id, ice_policy));
        self.transports.lock().unwrap().push(Arc::clone(&transport));
        Ok(transport)
    }
}

pub(crate) struct FakeTransport {
    id: String,
    pub(crate) direction: Direction,
    pub(crate) ice_policy: IceTransportPolicy,
    ice_tx: watch::Sender<IceState>,
    closed: AtomicBool,
    fail_connect: AtomicBool,
    connects: AtomicUsize,
}

impl FakeTransport {
    fn new(direction: Direction, id: &str, ice_policy: IceTransportPolicy) -> Self {
        let (ice_tx, _) = watch::channel(IceState::New);
        Self {
            id: id.to_string(),
            direction,
            ice_policy,
            ice_tx,
            closed: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_ice(&self, state: IceState) {
        self.ice_tx.send_replace(state);
    }

    pub(crate) fn fail_next_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineTransport for FakeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn dtls_parameters(&self) -> DtlsParameters {
        DtlsParameters(json!({
            "role": "auto",
            "fingerprints": [{"algorithm": "sha-256", "value": "AB:CD"}]
        }))
    }

    async fn complete_connect(&self) -> Result<(), EngineError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.swap(false, Ordering::SeqCst) {
            return Err(EngineError::new("dtls handshake failed"));
        }
        self.ice_tx.send_replace(IceState::Connected);
        Ok(())
    }

    async fn send_parameters(&self, track: &MediaTrack) -> Result<RtpParameters, EngineError> {
        Ok(RtpParameters(json!({"kind": track.kind(), "mid": track.id()})))
    }

    async fn receive(&self, consumer: &ConsumerOptions) -> Result<MediaTrack, EngineError> {
        Ok(MediaTrack::new(
            format!("remote-{}", consumer.id),
            consumer.kind,
        ))
    }

    fn ice_state(&self) -> watch::Receiver<IceState> {
        self.ice_tx.subscribe()
    }

    fn diagnostics(&self) -> TransportDiagnostics {
        TransportDiagnostics {
            local_candidates: vec!["udp 192.0.2.10:50000 host".into()],
            remote_candidates: vec!["udp 198.51.100.7:40000 host".into()],
            selected_pair: None,
            relayed: self.ice_policy == IceTransportPolicy::Relay,
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Recording sink
// ---------------------------------------------------------------------------

pub(crate) struct RecordingSink {
    binds: Mutex<Vec<usize>>,
    placeholders: AtomicUsize,
    detaches: AtomicUsize,
    rendering: watch::Sender<bool>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        let (rendering, _) = watch::channel(false);
        Self {
            binds: Mutex::new(Vec::new()),
            placeholders: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            rendering,
        }
    }
}

impl RecordingSink {
    /// Track counts of each bound stream, in bind order.
    pub(crate) fn binds(&self) -> Vec<usize> {
        self.binds.lock().unwrap().clone()
    }

    pub(crate) fn placeholder_count(&self) -> usize {
        self.placeholders.load(Ordering::SeqCst)
    }

    pub(crate) fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub(crate) fn deliver_frame(&self) {
        self.rendering.send_replace(true);
    }
}

#[async_trait]
impl MediaSink for RecordingSink {
    fn bind(&self, stream: &MediaStream) {
        self.binds.lock().unwrap().push(stream.len());
    }

    fn show_placeholder(&self) {
        self.placeholders.fetch_add(1, Ordering::SeqCst);
    }

    async fn first_frame(&self) -> Result<(), EngineError> {
        let mut rx = self.rendering.subscribe();
        rx.wait_for(|rendering| *rendering)
            .await
            .map(|_| ())
            .map_err(|_| EngineError::new("sink dropped"))
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        self.rendering.send_replace(false);
    }
}
