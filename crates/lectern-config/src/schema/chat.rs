use serde::{Deserialize, Serialize};

/// Live chat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Acknowledgement bound for history fetches.
    pub history_timeout_ms: u32,
    /// Messages retained locally per room.
    pub max_messages_per_room: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_timeout_ms: 5000,
            max_messages_per_room: 500,
        }
    }
}
