//! Local media model and the seams to the platform media stack.
//!
//! The signaling client never touches codecs or sockets directly. A
//! [`MediaEngine`] turns negotiation blobs into transports and tracks;
//! a [`MediaSink`] renders remote tracks.

mod engine;
mod sink;
mod track;

pub use engine::{
    EngineError, EngineTransport, IceServer, IceState, IceTransportPolicy, MediaEngine,
    TransportDiagnostics, TransportPolicy,
};
pub use sink::MediaSink;
pub use track::{MediaStream, MediaTrack};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Which way media flows over a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local tracks sent to the SFU.
    Publish,
    /// Remote tracks received from the SFU.
    Subscribe,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Publish => write!(f, "publish"),
            Direction::Subscribe => write!(f, "subscribe"),
        }
    }
}
