//! Client error types.

use std::fmt;

use feedwatch_core::TracingError;
use feedwatch_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// A secret reference could not be resolved.
    Secret(String),
    /// A source could not be registered.
    Server(ServerError),
    /// Output could not be encoded.
    Encode(serde_json::Error),
    /// IO error.
    Io(std::io::Error),
    /// Logging setup failed.
    Tracing(TracingError),
}

impl ClientError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Secret(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Secret(msg) => write!(f, "secret error: {msg}"),
            Self::Server(err) => write!(f, "source error: {err}"),
            Self::Encode(err) => write!(f, "encoding error: {err}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::Tracing(err) => write!(f, "logging error: {err}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Server(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Tracing(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err)
    }
}

impl From<TracingError> for ClientError {
    fn from(err: TracingError) -> Self {
        Self::Tracing(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(ClientError::Config("bad".into()).exit_code(), 2);
        assert_eq!(ClientError::Secret("unset".into()).exit_code(), 2);
        assert_eq!(
            ClientError::from(std::io::Error::other("closed")).exit_code(),
            1
        );
    }

    #[test]
    fn display() {
        let err = ClientError::from(ServerError::unknown_source("x"));
        assert_eq!(err.to_string(), "source error: No source registered with key: x");
    }
}
