//! Error taxonomy shared by every feed.
//!
//! Transport failures and parse failures travel through the same
//! [`ErrorInfo`] so a consumer has one error channel. Every error carries the
//! delay the source will wait before its next attempt.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// 401 or 403.
    AuthFailure,
    /// 429.
    RateLimited,
    /// Any 5xx.
    ServerError,
    /// Any other 4xx.
    ClientError,
    /// Connection failure or timeout.
    NetworkError,
    /// The body could not be turned into a document.
    ParseError,
    /// A non-2xx status outside the ranges above.
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailure => "AUTH_FAILURE",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::ClientError => "CLIENT_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// True for failures that came from the HTTP exchange itself.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::ParseError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified fetch or parse failure.
#[derive(Debug, Error)]
pub struct ErrorInfo {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    retry_after: Duration,
    retry_count: u32,
    url: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: Duration::ZERO,
            retry_count: 0,
            url: String::new(),
            source: None,
        }
    }

    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailure, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message)
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClientError, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownError, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = delay;
        self
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Delay before the source tries again.
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    /// Consecutive server-error count when the error was raised.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A cloneable, serializable snapshot for broadcasting.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind,
            message: self.message.clone(),
            status: self.status,
            retry_after_ms: u64::try_from(self.retry_after.as_millis()).unwrap_or(u64::MAX),
            retry_count: self.retry_count,
            url: self.url.clone(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.url.is_empty() {
            write!(f, "[{}] ", self.url)?;
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Wire form of an [`ErrorInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    #[serde(rename = "errorType")]
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    #[serde(rename = "retryAfter")]
    pub retry_after_ms: u64,
    pub retry_count: u32,
    pub url: String,
}

/// Result of a feed operation.
pub type FeedResult<T> = Result<T, ErrorInfo>;
