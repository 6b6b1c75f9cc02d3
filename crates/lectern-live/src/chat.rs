//! Chat history management.
//!
//! Stores messages per room with a bounded ring buffer so memory
//! usage stays predictable.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use lectern_common::RoomId;

/// A single chat message. The server sends bare text, so the arrival
/// time is stamped locally.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub room: RoomId,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(room: RoomId, text: impl Into<String>) -> Self {
        Self {
            room,
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Configuration for chat history storage.
#[derive(Debug, Clone)]
pub struct ChatHistoryConfig {
    /// Maximum messages to retain per room.
    pub max_messages_per_room: usize,
}

impl Default for ChatHistoryConfig {
    fn default() -> Self {
        Self {
            max_messages_per_room: 500,
        }
    }
}

/// In-memory chat history, keyed by room.
pub struct ChatHistory {
    config: ChatHistoryConfig,
    rooms: HashMap<RoomId, VecDeque<ChatMessage>>,
}

impl ChatHistory {
    pub fn new(config: ChatHistoryConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
        }
    }

    /// Push a message into its room. Oldest messages are evicted when the
    /// buffer is full.
    pub fn push(&mut self, msg: ChatMessage) {
        let buf = self.rooms.entry(msg.room.clone()).or_default();
        if buf.len() >= self.config.max_messages_per_room {
            buf.pop_front();
        }
        buf.push_back(msg);
    }

    /// Replace a room's history with a server snapshot (oldest first).
    pub fn replace(&mut self, room: &RoomId, messages: Vec<ChatMessage>) {
        let skip = messages
            .len()
            .saturating_sub(self.config.max_messages_per_room);
        let buf: VecDeque<ChatMessage> = messages.into_iter().skip(skip).collect();
        self.rooms.insert(room.clone(), buf);
    }

    /// A room's messages, oldest first.
    pub fn all(&self, room: &RoomId) -> Vec<&ChatMessage> {
        match self.rooms.get(room) {
            Some(buf) => buf.iter().collect(),
            None => Vec::new(),
        }
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(ChatHistoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(room: &str, text: &str) -> ChatMessage {
        ChatMessage::new(RoomId::from(room), text)
    }

    #[test]
    fn push_keeps_arrival_order() {
        let mut history = ChatHistory::default();
        let room = RoomId::from("R1");
        for i in 0..3 {
            history.push(msg("R1", &format!("m{i}")));
        }
        let all: Vec<&str> = history.all(&room).iter().map(|m| m.text.as_str()).collect();
        assert_eq!(all, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn oldest_messages_are_evicted() {
        let mut history = ChatHistory::new(ChatHistoryConfig {
            max_messages_per_room: 3,
        });
        for i in 0..5 {
            history.push(msg("R1", &format!("m{i}")));
        }
        let all: Vec<&str> = history
            .all(&RoomId::from("R1"))
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(all, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn rooms_are_isolated() {
        let mut history = ChatHistory::default();
        history.push(msg("R1", "hello"));
        history.push(msg("R2", "hi"));
        history.push(msg("R2", "there"));

        assert_eq!(history.all(&RoomId::from("R1")).len(), 1);
        assert_eq!(history.all(&RoomId::from("R2")).len(), 2);

        history.replace(&RoomId::from("R2"), Vec::new());
        assert!(history.all(&RoomId::from("R2")).is_empty());
        assert_eq!(history.all(&RoomId::from("R1")).len(), 1);
    }

    #[test]
    fn replace_keeps_newest_within_bound() {
        let mut history = ChatHistory::new(ChatHistoryConfig {
            max_messages_per_room: 2,
        });
        let room = RoomId::from("R1");
        history.push(msg("R1", "stale"));
        history.replace(
            &room,
            vec![msg("R1", "a"), msg("R1", "b"), msg("R1", "c")],
        );
        let all: Vec<&str> = history.all(&room).iter().map(|m| m.text.as_str()).collect();
        assert_eq!(all, vec!["b", "c"]);
    }

    #[test]
    fn unknown_room_is_empty() {
        let history = ChatHistory::default();
        assert!(history.all(&RoomId::from("nope")).is_empty());
    }
}
