//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Lectern live classroom configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[signaling]
url = "ws://localhost:9000/ws"
# connect_timeout_secs = 15        # 1-120
# reconnect_delay_secs = 1         # 1-60
# max_reconnect_delay_secs = 30    # 1-600
# request_timeout_ms = 10000       # 100-120000

[transport]
# force_relay = false   # route subscribe media through TURN only
# force_tcp = false

[[transport.ice_servers]]
urls = ["stun:stun.l.google.com:19302"]

# [[transport.ice_servers]]
# urls = ["turn:turn.example.com:3478?transport=tcp"]
# username = "lectern"
# credential = "change-me"

[chat]
# history_timeout_ms = 5000        # 100-60000
# max_messages_per_room = 500      # 10-10000

[whiteboard]
# debounce_ms = 100                # 10-5000

[logging]
# level = "info"                   # trace, debug, info, warn, error
"##
    .to_string()
}
