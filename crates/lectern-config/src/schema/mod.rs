//! Configuration schema types for Lectern.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod chat;
mod logging;
mod signaling;
mod transport;
mod whiteboard;

pub use chat::*;
pub use logging::*;
pub use signaling::*;
pub use transport::*;
pub use whiteboard::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for the live classroom client.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LecternConfig {
    pub signaling: SignalingConfig,
    pub transport: TransportConfig,
    pub chat: ChatConfig,
    pub whiteboard: WhiteboardConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
