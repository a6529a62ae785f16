use thiserror::Error;

/// Error type shared by every strata crate
#[derive(Debug, Error)]
pub enum StrataError {
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("circular dependency detected while expanding key: {key}")]
    CircularDependency { key: String },

    #[error("value of type {found} referenced by {key} cannot be spliced into text")]
    NotText { key: String, found: String },

    #[error("decoding failed with {} error(s): {}", .errors.len(), .errors.join("; "))]
    Decode { errors: Vec<String> },

    #[error("invalid watch pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("failed to pull {path} from {source_name}: {message}")]
    Pull {
        source_name: String,
        path: String,
        message: String,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("no client registered under name: {0}")]
    UnknownClient(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("watch is disabled for this client")]
    WatchDisabled,

    #[error("{client} client does not implement {operation}")]
    NotImplemented { client: String, operation: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StrataError {
    pub fn key_not_found<S: Into<String>>(key: S) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub fn circular<S: Into<String>>(key: S) -> Self {
        Self::CircularDependency { key: key.into() }
    }

    pub fn pull_error<A, B, C>(source_name: A, path: B, message: C) -> Self
    where
        A: Into<String>,
        B: Into<String>,
        C: Into<String>,
    {
        Self::Pull {
            source_name: source_name.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn parse_error<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_implemented<A: Into<String>, B: Into<String>>(client: A, operation: B) -> Self {
        Self::NotImplemented {
            client: client.into(),
            operation: operation.into(),
        }
    }

    /// Errors that should stop process initialization when they surface
    /// from bootstrap code.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StrataError::Pull { .. }
                | StrataError::UnknownClient(_)
                | StrataError::Configuration(_)
                | StrataError::Internal(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StrataError::Pull { .. } | StrataError::Timeout(_) | StrataError::Io(_)
        )
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for StrataError {
    fn from(err: config::ConfigError) -> Self {
        StrataError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_lists_every_field() {
        let err = StrataError::Decode {
            errors: vec!["port: expected u16".into(), "debug: expected bool".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 error(s)"));
        assert!(msg.contains("port: expected u16"));
        assert!(msg.contains("debug: expected bool"));
    }

    #[test]
    fn test_error_classification() {
        assert!(StrataError::pull_error("file", "a.yaml", "missing").is_fatal());
        assert!(StrataError::UnknownClient("etcd".into()).is_fatal());
        assert!(!StrataError::circular("x").is_fatal());
        assert!(StrataError::Timeout("pull".into()).is_retryable());
        assert!(!StrataError::WatchDisabled.is_retryable());
    }
}
