//! Chat and whiteboard traffic that shares the signaling socket with
//! media negotiation.

use std::sync::Arc;
use std::time::Duration;

use lectern_common::RoomId;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::chat::{ChatHistory, ChatHistoryConfig, ChatMessage};
use crate::error::{LiveError, Result};
use crate::protocol::{events, message_text, HistoryResponse, UserMessagePayload};
use crate::signaling::ScopedChannel;
use crate::whiteboard::{WhiteboardBroadcaster, WhiteboardEvent, WhiteboardSnapshot};

/// Buffer size for chat and whiteboard subscriber channels.
const SUBSCRIBER_BUFFER: usize = 256;

/// Settings for the auxiliary channels.
#[derive(Debug, Clone)]
pub struct AuxiliaryConfig {
    pub history_timeout: Duration,
    pub max_messages_per_room: usize,
    pub whiteboard_debounce: Duration,
}

impl Default for AuxiliaryConfig {
    fn default() -> Self {
        Self {
            history_timeout: Duration::from_millis(5000),
            max_messages_per_room: 500,
            whiteboard_debounce: Duration::from_millis(100),
        }
    }
}

/// Room chat and whiteboard on top of a [`ScopedChannel`].
pub struct AuxiliaryChannelMux {
    signaling: ScopedChannel,
    config: AuxiliaryConfig,
    history: Arc<RwLock<ChatHistory>>,
    whiteboard: WhiteboardBroadcaster,
}

impl AuxiliaryChannelMux {
    pub fn new(signaling: ScopedChannel, config: AuxiliaryConfig) -> Self {
        let history = ChatHistory::new(ChatHistoryConfig {
            max_messages_per_room: config.max_messages_per_room,
        });
        let whiteboard = WhiteboardBroadcaster::spawn(signaling.clone(), config.whiteboard_debounce);
        Self {
            signaling,
            config,
            history: Arc::new(RwLock::new(history)),
            whiteboard,
        }
    }

    /// Announce this client in `room`. The join is repeated after every
    /// signaling reconnect until this mux's scope detaches.
    pub async fn join_room(&self, room: &RoomId) -> Result<()> {
        info!(%room, "Joining room");
        self.signaling
            .send_sticky(events::USER_JOIN_ROOM, Value::String(room.to_string()))
            .await
    }

    pub async fn send_chat(&self, text: &str, room: &RoomId) -> Result<()> {
        let payload = UserMessagePayload {
            message: text.to_string(),
            room_id: room.to_string(),
        };
        self.signaling
            .send(events::USER_MESSAGE, serde_json::to_value(payload)?)
            .await
    }

    /// Stream chat messages for `room`. Each message is also kept in the
    /// local history.
    pub async fn on_chat(&self, room: &RoomId) -> Result<mpsc::Receiver<ChatMessage>> {
        let mut frames = self.signaling.listen(events::NEW_MESSAGE).await?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let history = Arc::clone(&self.history);
        let room = room.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let message = ChatMessage::new(room.clone(), message_text(&frame.data));
                history.write().await.push(message.clone());
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            debug!(%room, "Chat relay stopped");
        });
        Ok(rx)
    }

    /// Listen for chat in `room`, join it, then fetch its backlog.
    ///
    /// Messages sent while the backlog is in flight arrive on the returned
    /// receiver. An unavailable backlog is logged and comes back empty.
    pub async fn enter_chat(
        &self,
        room: &RoomId,
    ) -> Result<(Vec<ChatMessage>, mpsc::Receiver<ChatMessage>)> {
        let live = self.on_chat(room).await?;
        self.join_room(room).await?;
        let backlog = match self.fetch_history_default(room).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(%room, error = %e, "Chat history unavailable");
                Vec::new()
            }
        };
        Ok((backlog, live))
    }

    /// Fetch the room's stored messages from the server.
    ///
    /// No answer within `timeout` is [`LiveError::Timeout`]; an answer
    /// with a non-`ok` status is [`LiveError::Rejected`].
    pub async fn fetch_history(&self, room: &RoomId, timeout: Duration) -> Result<Vec<ChatMessage>> {
        let ack = self
            .signaling
            .ack_request(
                events::GET_MESSAGES,
                Value::String(room.to_string()),
                timeout,
            )
            .await?;
        let response: HistoryResponse = serde_json::from_value(ack)?;
        if !response.is_ok() {
            return Err(LiveError::Rejected {
                event: events::GET_MESSAGES.to_string(),
                reason: format!("status {}", response.status),
            });
        }

        let messages: Vec<ChatMessage> = response
            .messages
            .iter()
            .map(|m| ChatMessage::new(room.clone(), message_text(m)))
            .collect();
        debug!(%room, count = messages.len(), "Fetched chat history");
        self.history.write().await.replace(room, messages.clone());
        Ok(messages)
    }

    /// [`fetch_history`](Self::fetch_history) with the configured timeout.
    pub async fn fetch_history_default(&self, room: &RoomId) -> Result<Vec<ChatMessage>> {
        self.fetch_history(room, self.config.history_timeout).await
    }

    pub async fn chat_history(&self, room: &RoomId) -> Vec<ChatMessage> {
        self.history
            .read()
            .await
            .all(room)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Queue a whiteboard snapshot for debounced broadcast.
    pub fn broadcast_whiteboard(&self, elements: Vec<Value>) {
        self.whiteboard.update(WhiteboardSnapshot::new(elements));
    }

    /// Ask the server to replay the current board to this client.
    pub async fn request_whiteboard_replay(&self, room: &RoomId) -> Result<()> {
        self.signaling
            .send(
                events::REQUEST_WHITEBOARD_STATE,
                Value::String(room.to_string()),
            )
            .await
    }

    /// Close the board. A snapshot still waiting in the debouncer is
    /// dropped so it cannot reopen the board afterwards.
    pub async fn close_whiteboard(&self) -> Result<()> {
        self.whiteboard.discard_pending().await;
        self.signaling
            .send(events::WHITEBOARD_CLOSE, Value::Null)
            .await
    }

    /// Stream inbound whiteboard updates and close notices.
    pub async fn on_whiteboard(&self) -> Result<mpsc::Receiver<WhiteboardEvent>> {
        let mut updates = self.signaling.listen(events::WHITEBOARD_UPDATE).await?;
        let mut closes = self.signaling.listen(events::WHITEBOARD_CLOSE).await?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    frame = updates.recv() => match frame {
                        Some(frame) => WhiteboardEvent::Updated(WhiteboardSnapshot::from_wire(frame.data)),
                        None => break,
                    },
                    frame = closes.recv() => match frame {
                        Some(_) => WhiteboardEvent::Closed,
                        None => break,
                    },
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!("Whiteboard relay stopped");
        });
        Ok(rx)
    }

    /// Stop background work.
    pub fn shutdown(&self) {
        self.whiteboard.stop();
    }
}
