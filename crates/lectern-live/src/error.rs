use std::time::Duration;

use crate::media::{Direction, EngineError};

/// Errors surfaced by the live session stack.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LiveError {
    #[error("device is not loaded with router capabilities")]
    DeviceNotReady,

    #[error("failed to load router capabilities: {0}")]
    CapabilityLoad(String),

    #[error("{direction} transport failed to connect: {reason}")]
    TransportConnectionFailed { direction: Direction, reason: String },

    #[error("{0} transport is not connected")]
    TransportNotConnected(Direction),

    #[error("no answer to {event} within {after:?}")]
    Timeout { event: String, after: Duration },

    #[error("subscription to producer {producer_id} failed: {reason}")]
    Subscription { producer_id: String, reason: String },

    #[error("server rejected {event}: {reason}")]
    Rejected { event: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("a session is already active on this client")]
    SessionActive,

    #[error("media engine error: {0}")]
    Engine(String),
}

impl From<EngineError> for LiveError {
    fn from(err: EngineError) -> Self {
        LiveError::Engine(err.0)
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(err: serde_json::Error) -> Self {
        LiveError::Protocol(err.to_string())
    }
}

impl From<LiveError> for lectern_common::LecternError {
    fn from(err: LiveError) -> Self {
        match err {
            LiveError::Signaling(_) | LiveError::Timeout { .. } => Self::Network(err.to_string()),
            other => Self::Session(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_name_the_direction() {
        let err = LiveError::TransportNotConnected(Direction::Publish);
        assert_eq!(err.to_string(), "publish transport is not connected");

        let err = LiveError::TransportConnectionFailed {
            direction: Direction::Subscribe,
            reason: "ice failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "subscribe transport failed to connect: ice failed"
        );
    }

    #[test]
    fn timeout_and_rejection_are_distinct() {
        let timeout = LiveError::Timeout {
            event: "get-messages".into(),
            after: Duration::from_millis(5000),
        };
        let rejected = LiveError::Rejected {
            event: "get-messages".into(),
            reason: "status error".into(),
        };
        assert!(timeout.to_string().contains("5s"));
        assert!(rejected.to_string().contains("status error"));
    }

    #[test]
    fn engine_error_converts() {
        let err: LiveError = EngineError::new("codec mismatch").into();
        assert!(matches!(err, LiveError::Engine(ref m) if m == "codec mismatch"));
    }

    #[test]
    fn maps_into_application_errors() {
        let err: lectern_common::LecternError = LiveError::Signaling("closed".into()).into();
        assert!(matches!(err, lectern_common::LecternError::Network(_)));

        let err: lectern_common::LecternError = LiveError::SessionActive.into();
        assert!(matches!(err, lectern_common::LecternError::Session(_)));
    }
}
