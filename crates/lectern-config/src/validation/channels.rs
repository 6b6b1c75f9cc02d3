//! Chat and whiteboard validation.

use crate::schema::LecternConfig;

use super::helpers::validate_range;

pub(crate) fn validate_chat(errors: &mut Vec<String>, config: &LecternConfig) {
    validate_range(
        errors,
        "chat.history_timeout_ms",
        config.chat.history_timeout_ms,
        100,
        60_000,
    );
    validate_range(
        errors,
        "chat.max_messages_per_room",
        config.chat.max_messages_per_room,
        10,
        10_000,
    );
}

pub(crate) fn validate_whiteboard(errors: &mut Vec<String>, config: &LecternConfig) {
    validate_range(
        errors,
        "whiteboard.debounce_ms",
        config.whiteboard.debounce_ms,
        10,
        5000,
    );
}
