//! Configuration and state types for the signaling channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the signaling WebSocket.
#[derive(Clone)]
pub struct SignalingConfig {
    /// `ws://` or `wss://` endpoint. May carry an access token in the query.
    pub url: String,
    pub connect_timeout: Duration,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// How long a negotiation request waits for its answer.
    pub request_timeout: Duration,
}

impl SignalingConfig {
    /// URL without its query string, safe to log.
    pub fn display_url(&self) -> &str {
        self.url.split('?').next().unwrap_or("")
    }
}

impl std::fmt::Debug for SignalingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingConfig")
            .field("url", &self.display_url())
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9000/ws".to_string(),
            connect_timeout: Duration::from_secs(15),
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            request_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Whether the socket is currently up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Owner tag for listeners and pending requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope(u64);

impl Scope {
    pub fn next() -> Self {
        Self(SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_query_string() {
        let config = SignalingConfig {
            url: "wss://class.example.com/ws?token=abc123".into(),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("wss://class.example.com/ws"));
        assert!(!debug.contains("abc123"));
    }

    #[test]
    fn scopes_are_unique() {
        assert_ne!(Scope::next(), Scope::next());
    }
}
