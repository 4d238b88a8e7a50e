//! Per-source transport configuration.

use std::time::Duration;

use url::Url;

use super::auth::Auth;

/// Configuration of one polled source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// The URL fetched on every attempt.
    pub url: Url,

    /// Base delay between successful fetches.
    pub reload_interval: Duration,

    /// Optional credentials.
    pub auth: Option<Auth>,

    /// Extra request headers, sent in order; they may override `User-Agent`.
    pub headers: Vec<(String, String)>,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Cap on the server-error backoff exponent.
    pub max_retries: u32,

    /// User agent string.
    pub user_agent: String,
}

impl SourceConfig {
    /// Default reload interval in seconds.
    pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 5 * 60;

    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default cap on the backoff exponent.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Creates a configuration for `url` with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(Url::parse(url.as_ref())?))
    }

    /// Creates a configuration for an already parsed URL.
    pub fn from_url(url: Url) -> Self {
        Self {
            url,
            reload_interval: Duration::from_secs(Self::DEFAULT_RELOAD_INTERVAL_SECS),
            auth: None,
            headers: Vec::new(),
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            max_retries: Self::DEFAULT_MAX_RETRIES,
            user_agent: default_user_agent(),
        }
    }

    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Accepts self-signed and otherwise invalid certificates.
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }
}

/// `feedwatch/<version>`.
pub fn default_user_agent() -> String {
    format!("feedwatch/{}", env!("CARGO_PKG_VERSION"))
}
