//! ICE server and relay policy validation.

use crate::schema::LecternConfig;

const ICE_SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

pub(crate) fn validate_transport(errors: &mut Vec<String>, config: &LecternConfig) {
    let transport = &config.transport;

    for (i, server) in transport.ice_servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("transport.ice_servers[{i}].urls must not be empty"));
        }
        for url in &server.urls {
            if !ICE_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                errors.push(format!(
                    "transport.ice_servers[{i}] url {url} is not a stun:/turn: url"
                ));
            }
        }
        if server.is_relay() && (server.username.is_none() || server.credential.is_none()) {
            errors.push(format!(
                "transport.ice_servers[{i}] is a TURN server and needs username and credential"
            ));
        }
    }

    if transport.force_relay && !transport.ice_servers.iter().any(|s| s.is_relay()) {
        errors.push("transport.force_relay requires at least one turn: server".into());
    }
}
