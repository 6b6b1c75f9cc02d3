use serde::{Deserialize, Serialize};

/// A STUN or TURN server handed to the media engine.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl std::fmt::Debug for IceServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IceServerConfig")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for IceServerConfig {
    fn default() -> Self {
        Self {
            urls: vec!["stun:stun.l.google.com:19302".into()],
            username: None,
            credential: None,
        }
    }
}

impl IceServerConfig {
    /// Whether any of the urls points at a TURN relay.
    pub fn is_relay(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("turn:") || u.starts_with("turns:"))
    }
}

/// Media transport policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Force every ICE candidate of subscribe transports through a relay.
    /// Trades latency for reachability on restrictive networks.
    pub force_relay: bool,
    /// Ask the server for TCP-only transports.
    pub force_tcp: bool,
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            force_relay: false,
            force_tcp: false,
            ice_servers: vec![IceServerConfig::default()],
        }
    }
}
