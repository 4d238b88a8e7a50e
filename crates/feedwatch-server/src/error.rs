//! Server error types.

use feedwatch_providers::ErrorInfo;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while registering or driving sources.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The source URL does not parse.
    #[error("Malformed URL {url}: {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// No source is registered under this key.
    #[error("No source registered with key: {key}")]
    UnknownSource { key: String },

    /// A chat registration lacks its token or chat id.
    #[error("Missing chat credentials: {what}")]
    MissingCredentials { what: &'static str },

    /// The source could not be built.
    #[error(transparent)]
    Feed(#[from] ErrorInfo),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The source task is gone.
    #[error("Source task stopped: {key}")]
    Stopped { key: String },
}

impl ServerError {
    /// Creates a malformed URL error.
    pub fn malformed_url(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::MalformedUrl {
            url: url.into(),
            source,
        }
    }

    /// Creates an unknown source error.
    pub fn unknown_source(key: impl Into<String>) -> Self {
        Self::UnknownSource { key: key.into() }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a stopped task error.
    pub fn stopped(key: impl Into<String>) -> Self {
        Self::Stopped { key: key.into() }
    }

    /// Wire name of the error, as sent to consumers.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MalformedUrl { .. } => "MODULE_ERROR_MALFORMED_URL",
            Self::Feed(err) => err.kind().as_str(),
            _ => "MODULE_ERROR_UNSPECIFIED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ServerError::unknown_source("workhttps://example.com/cal.ics");
        assert_eq!(
            err.to_string(),
            "No source registered with key: workhttps://example.com/cal.ics"
        );

        let err = ServerError::config("user agent is empty");
        assert_eq!(err.to_string(), "Configuration error: user agent is empty");
    }

    #[test]
    fn error_types() {
        let source = url::Url::parse("not a url").unwrap_err();
        assert_eq!(
            ServerError::malformed_url("not a url", source).error_type(),
            "MODULE_ERROR_MALFORMED_URL"
        );
        assert_eq!(
            ServerError::unknown_source("x").error_type(),
            "MODULE_ERROR_UNSPECIFIED"
        );
        assert_eq!(
            ServerError::from(ErrorInfo::network("down")).error_type(),
            "NETWORK_ERROR"
        );
    }
}
