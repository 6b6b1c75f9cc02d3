//! Full configuration validation.
//!
//! Each domain has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod channels;
mod helpers;
mod signaling;
mod transport;


use crate::schema::LecternConfig;
use lectern_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &LecternConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    signaling::validate_signaling(&mut errors, config);
    transport::validate_transport(&mut errors, config);
    channels::validate_chat(&mut errors, config);
    channels::validate_whiteboard(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
