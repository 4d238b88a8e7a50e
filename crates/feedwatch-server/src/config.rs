//! Server configuration and source registrations.

use std::time::Duration;

use feedwatch_providers::http::{Auth, SourceConfig};
use feedwatch_providers::{NewsOptions, NormalizeOptions};

/// Shortest interval accepted for calendar sources.
pub const MIN_CALENDAR_INTERVAL: Duration = Duration::from_secs(60);

/// Default interval between calendar and news fetches.
pub const DEFAULT_RELOAD_INTERVAL: Duration =
    Duration::from_secs(SourceConfig::DEFAULT_RELOAD_INTERVAL_SECS);

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Whether sources re-arm their timer after each fetch. When false each
    /// source fetches once on creation and then only on request.
    pub background_timers: bool,

    /// Capacity of the notification channel.
    pub channel_capacity: usize,

    /// User agent sent by every source, `None` for the default.
    pub user_agent: Option<String>,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            background_timers: true,
            channel_capacity: 64,
            user_agent: None,
            request_timeout: Duration::from_secs(SourceConfig::DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Builder: enable or disable background timers.
    pub fn with_background_timers(mut self, enabled: bool) -> Self {
        self.background_timers = enabled;
        self
    }

    /// Builder: set the notification channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Builder: set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builder: set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Applies the registry-wide settings to a source configuration.
    pub(crate) fn apply(&self, config: SourceConfig) -> SourceConfig {
        let config = config.with_timeout(self.request_timeout);
        match self.user_agent {
            Some(ref user_agent) => config.with_user_agent(user_agent.clone()),
            None => config,
        }
    }
}

/// A calendar to register.
#[derive(Debug, Clone)]
pub struct CalendarSource {
    /// Identifier of the consumer that asked for the calendar.
    pub id: String,
    pub url: String,
    pub fetch_interval: Duration,
    pub auth: Option<Auth>,
    /// Accept self-signed certificates.
    pub self_signed_cert: bool,
    pub options: NormalizeOptions,
}

impl CalendarSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            fetch_interval: DEFAULT_RELOAD_INTERVAL,
            auth: None,
            self_signed_cert: false,
            options: NormalizeOptions::default(),
        }
    }

    pub fn with_fetch_interval(mut self, interval: Duration) -> Self {
        self.fetch_interval = interval;
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_self_signed_cert(mut self, accept: bool) -> Self {
        self.self_signed_cert = accept;
        self
    }

    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    /// Registry key: one source per consumer and URL.
    pub fn key(&self) -> String {
        format!("{}{}", self.id, self.url)
    }
}

/// A news feed to register.
#[derive(Debug, Clone)]
pub struct NewsSource {
    pub url: String,
    pub reload_interval: Duration,
    pub auth: Option<Auth>,
    pub options: NewsOptions,
}

impl NewsSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reload_interval: DEFAULT_RELOAD_INTERVAL,
            auth: None,
            options: NewsOptions::default(),
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

    pub fn with_options(mut self, options: NewsOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert!(config.background_timers);
        assert_eq!(config.channel_capacity, 64);
        assert!(config.user_agent.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn builder_pattern() {
        let config = ServerConfig::default()
            .with_background_timers(false)
            .with_channel_capacity(0)
            .with_user_agent("test/1.0")
            .with_request_timeout(Duration::from_secs(5));

        assert!(!config.background_timers);
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.user_agent.as_deref(), Some("test/1.0"));

        let source = config.apply(SourceConfig::new("https://example.com/").unwrap());
        assert_eq!(source.user_agent, "test/1.0");
        assert_eq!(source.timeout, Duration::from_secs(5));
    }

    #[test]
    fn calendar_key_joins_id_and_url() {
        let source = CalendarSource::new("work", "https://example.com/cal.ics");
        assert_eq!(source.key(), "workhttps://example.com/cal.ics");
        assert_eq!(source.fetch_interval, Duration::from_secs(300));
    }
}
