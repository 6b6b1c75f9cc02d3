//! Runtime settings derived from the on-disk configuration.

use std::time::Duration;

use lectern_config::LecternConfig;

use crate::auxiliary::AuxiliaryConfig;
use crate::media::{IceServer, TransportPolicy};
use crate::signaling::SignalingConfig;

#[derive(Debug, Clone, Default)]
pub struct LiveConfig {
    pub signaling: SignalingConfig,
    pub transport: TransportPolicy,
    pub auxiliary: AuxiliaryConfig,
}

impl From<&LecternConfig> for LiveConfig {
    fn from(config: &LecternConfig) -> Self {
        let signaling = &config.signaling;
        Self {
            signaling: SignalingConfig {
                url: signaling.url.clone(),
                connect_timeout: Duration::from_secs(u64::from(signaling.connect_timeout_secs)),
                reconnect_delay_secs: u64::from(signaling.reconnect_delay_secs),
                max_reconnect_delay_secs: u64::from(signaling.max_reconnect_delay_secs),
                request_timeout: Duration::from_millis(u64::from(signaling.request_timeout_ms)),
            },
            transport: TransportPolicy {
                force_relay: config.transport.force_relay,
                force_tcp: config.transport.force_tcp,
                ice_servers: config
                    .transport
                    .ice_servers
                    .iter()
                    .map(|s| IceServer {
                        urls: s.urls.clone(),
                        username: s.username.clone(),
                        credential: s.credential.clone(),
                    })
                    .collect(),
            },
            auxiliary: AuxiliaryConfig {
                history_timeout: Duration::from_millis(u64::from(config.chat.history_timeout_ms)),
                max_messages_per_room: config.chat.max_messages_per_room as usize,
                whiteboard_debounce: Duration::from_millis(u64::from(config.whiteboard.debounce_ms)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_through() {
        let live = LiveConfig::from(&LecternConfig::default());
        assert_eq!(live.signaling.url, "ws://localhost:9000/ws");
        assert_eq!(live.signaling.connect_timeout, Duration::from_secs(15));
        assert_eq!(live.signaling.request_timeout, Duration::from_secs(10));
        assert_eq!(live.auxiliary.history_timeout, Duration::from_millis(5000));
        assert_eq!(live.auxiliary.whiteboard_debounce, Duration::from_millis(100));
        assert_eq!(live.auxiliary.max_messages_per_room, 500);
        assert!(!live.transport.force_relay);
        assert_eq!(live.transport.ice_servers.len(), 1);
    }

    #[test]
    fn relay_settings_map_through() {
        let mut config = LecternConfig::default();
        config.transport.force_relay = true;
        config.transport.force_tcp = true;
        let live = LiveConfig::from(&config);
        assert!(live.transport.force_relay);
        assert!(live.transport.force_tcp);
    }
}
