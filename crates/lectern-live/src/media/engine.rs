use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{Direction, MediaTrack};
use crate::protocol::{
    ConsumerOptions, DtlsParameters, RouterCapabilities, RtpCapabilities, RtpParameters,
    TransportOptions,
};

/// Failure reported by a media engine implementation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

// ---------------------------------------------------------------------------
// ICE policy
// ---------------------------------------------------------------------------

/// Which candidate types a transport may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IceTransportPolicy {
    #[default]
    All,
    /// Relay (TURN) candidates only.
    Relay,
}

/// STUN/TURN server handed to the engine.
#[derive(Clone, Default)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl std::fmt::Debug for IceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IceServer")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Transport policy derived from configuration.
#[derive(Debug, Clone, Default)]
pub struct TransportPolicy {
    pub force_relay: bool,
    pub force_tcp: bool,
    pub ice_servers: Vec<IceServer>,
}

impl TransportPolicy {
    /// Forced relay applies to the subscribe direction only; publishing
    /// keeps direct candidates.
    pub fn ice_policy_for(&self, direction: Direction) -> IceTransportPolicy {
        match direction {
            Direction::Subscribe if self.force_relay => IceTransportPolicy::Relay,
            _ => IceTransportPolicy::All,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine traits
// ---------------------------------------------------------------------------

/// ICE connection state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Snapshot used to diagnose a failed transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportDiagnostics {
    pub local_candidates: Vec<String>,
    pub remote_candidates: Vec<String>,
    pub selected_pair: Option<String>,
    pub relayed: bool,
}

/// The platform media stack (an SFU client library binding).
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Load the router's capabilities and return the device's own.
    async fn load(&self, router: &RouterCapabilities) -> Result<RtpCapabilities, EngineError>;

    /// Build a local transport mirroring the server-side one.
    async fn create_transport(
        &self,
        direction: Direction,
        options: &TransportOptions,
        ice_policy: IceTransportPolicy,
        ice_servers: &[IceServer],
    ) -> Result<Arc<dyn EngineTransport>, EngineError>;
}

/// Local side of one negotiated transport.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    fn id(&self) -> &str;

    /// DTLS parameters to send in the connect request.
    fn dtls_parameters(&self) -> DtlsParameters;

    /// Called once the server confirmed the connect request.
    async fn complete_connect(&self) -> Result<(), EngineError>;

    /// Encode parameters for sending `track` over this transport.
    async fn send_parameters(&self, track: &MediaTrack) -> Result<RtpParameters, EngineError>;

    /// Materialize the remote track described by `consumer`.
    async fn receive(&self, consumer: &ConsumerOptions) -> Result<MediaTrack, EngineError>;

    fn ice_state(&self) -> watch::Receiver<IceState>;

    fn diagnostics(&self) -> TransportDiagnostics;

    fn close(&self);
}
