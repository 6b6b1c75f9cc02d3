use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),

    #[error("config write error: {0}")]
    WriteError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LecternError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("signaling.url must not be empty".into());
        assert_eq!(
            err.to_string(),
            "config validation error: signaling.url must not be empty"
        );

        let err = ConfigError::WriteError("read-only filesystem".into());
        assert_eq!(err.to_string(), "config write error: read-only filesystem");
    }

    #[test]
    fn lectern_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: LecternError = config_err.into();
        assert!(matches!(err, LecternError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn lectern_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: LecternError = io_err.into();
        assert!(matches!(err, LecternError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn lectern_error_other_variants() {
        let err = LecternError::Network("connection refused".into());
        assert_eq!(err.to_string(), "network error: connection refused");

        let err = LecternError::Session("history fetch timed out".into());
        assert_eq!(err.to_string(), "session error: history fetch timed out");

        let err = LecternError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
