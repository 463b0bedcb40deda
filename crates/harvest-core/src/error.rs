use std::fmt;

use thiserror::Error;

/// Application-wide error types for the harvester.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Markup or JSON could not be interpreted (including bad selectors).
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A field value could not be converted to its declared type.
    #[error("Cannot convert {value:?} to {target}: {reason}")]
    CoercionError {
        value: String,
        target: &'static str,
        reason: String,
    },

    /// The persistence sink is unreachable or rejected a write.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

/// Coarse classification used by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Parse,
    Coercion,
    Persistence,
    Config,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Parse => "parse",
            ErrorKind::Coercion => "coercion",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Config => "config",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::HttpError(_) | AppError::Timeout(_) | AppError::NetworkError(_) => {
                ErrorKind::Transport
            }
            AppError::ParseError(_) | AppError::SerializationError(_) => ErrorKind::Parse,
            AppError::CoercionError { .. } => ErrorKind::Coercion,
            AppError::PersistenceError(_) => ErrorKind::Persistence,
            AppError::ConfigError(_) => ErrorKind::Config,
            AppError::Generic(_) => ErrorKind::Other,
        }
    }

    /// Returns true for connection, timeout and non-2xx failures.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kinds() {
        assert!(AppError::NetworkError("reset".into()).is_transport());
        assert!(AppError::Timeout(10).is_transport());
        assert!(AppError::HttpError("HTTP 503".into()).is_transport());
        assert!(!AppError::ParseError("bad selector".into()).is_transport());
    }

    #[test]
    fn test_kind_classification() {
        let coercion = AppError::CoercionError {
            value: "abc".into(),
            target: "integer",
            reason: "invalid digit found in string".into(),
        };
        assert_eq!(coercion.kind(), ErrorKind::Coercion);
        assert_eq!(
            AppError::PersistenceError("refused".into()).kind(),
            ErrorKind::Persistence
        );

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(AppError::from(json_err).kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_coercion_message() {
        let err = AppError::CoercionError {
            value: "4l".into(),
            target: "integer",
            reason: "invalid digit found in string".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot convert \"4l\" to integer: invalid digit found in string"
        );
    }
}
