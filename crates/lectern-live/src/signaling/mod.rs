//! Signaling channel to the classroom server.
//!
//! A single WebSocket carries negotiation requests, chat, and whiteboard
//! traffic. Requests are paired with answers by `ref`; server-initiated
//! frames go to listeners registered per event and per [`Scope`], so one
//! session can drop all of its handlers at once.

mod channel;
mod connection;
mod dispatch;
mod types;

pub use channel::{ScopedChannel, SignalingChannel, WeakSignaling};
pub use types::{ConnectionStatus, Scope, SignalingConfig};

#[cfg(test)]
pub(crate) use channel::Inner;
