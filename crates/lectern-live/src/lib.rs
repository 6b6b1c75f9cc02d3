//! Live classroom client: SFU signaling, media negotiation, chat and
//! whiteboard over a single WebSocket.

pub mod auxiliary;
pub mod chat;
pub mod config;
pub mod consumer;
pub(crate) mod context;
pub mod device;
pub mod error;
pub mod media;
pub mod producer;
pub mod protocol;
pub mod session;
pub mod signaling;
pub mod transport;
pub mod whiteboard;

#[cfg(test)]
mod testing;

pub use auxiliary::{AuxiliaryChannelMux, AuxiliaryConfig};
pub use chat::{ChatHistory, ChatHistoryConfig, ChatMessage};
pub use config::LiveConfig;
pub use consumer::{
    Consumer, ConsumerSession, ConsumerState, NegotiationState, PlaybackState, StreamAttachment,
};
pub use device::{CapabilityNegotiator, Device};
pub use error::{LiveError, Result};
pub use media::{
    Direction, EngineError, EngineTransport, IceServer, IceState, IceTransportPolicy, MediaEngine,
    MediaKind, MediaSink, MediaStream, MediaTrack, TransportDiagnostics, TransportPolicy,
};
pub use producer::{Producer, ProducerSession, ProducerState};
pub use session::{LiveClient, Role, Session, SessionEvent, SessionStatus};
pub use signaling::{ConnectionStatus, ScopedChannel, SignalingChannel, SignalingConfig};
pub use transport::{Transport, TransportManager, TransportState};
pub use whiteboard::{WhiteboardEvent, WhiteboardMirror, WhiteboardSnapshot};
