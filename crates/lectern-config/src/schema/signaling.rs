use serde::{Deserialize, Serialize};

/// Connection to the classroom signaling server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the signaling server.
    pub url: String,
    /// Give up on a single connection attempt after this many seconds.
    pub connect_timeout_secs: u32,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u32,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u32,
    /// How long a correlated negotiation request may stay unanswered.
    pub request_timeout_ms: u32,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9000/ws".into(),
            connect_timeout_secs: 15,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            request_timeout_ms: 10_000,
        }
    }
}
