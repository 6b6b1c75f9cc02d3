use serde::{Deserialize, Serialize};

/// Collaborative whiteboard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteboardConfig {
    /// Quiet period before a local edit is broadcast.
    pub debounce_ms: u32,
}

impl Default for WhiteboardConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}
