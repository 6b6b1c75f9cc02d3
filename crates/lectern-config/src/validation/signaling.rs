//! Signaling connection validation.

use crate::schema::LecternConfig;

use super::helpers::validate_range;

pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &LecternConfig) {
    let signaling = &config.signaling;

    if signaling.url.trim().is_empty() {
        errors.push("signaling.url must not be empty".into());
    } else if !(signaling.url.starts_with("ws://") || signaling.url.starts_with("wss://")) {
        errors.push(format!(
            "signaling.url = {} must use the ws:// or wss:// scheme",
            signaling.url
        ));
    }

    validate_range(
        errors,
        "signaling.connect_timeout_secs",
        signaling.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "signaling.reconnect_delay_secs",
        signaling.reconnect_delay_secs,
        1,
        60,
    );
    validate_range(
        errors,
        "signaling.max_reconnect_delay_secs",
        signaling.max_reconnect_delay_secs,
        1,
        600,
    );
    if signaling.max_reconnect_delay_secs < signaling.reconnect_delay_secs {
        errors.push(format!(
            "signaling.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            signaling.max_reconnect_delay_secs, signaling.reconnect_delay_secs
        ));
    }
    validate_range(
        errors,
        "signaling.request_timeout_ms",
        signaling.request_timeout_ms,
        100,
        120_000,
    );
}
