//! Client configuration.
//!
//! All sources live in a single `config.toml` file at
//! `~/.config/feedwatch/config.toml` by default:
//!
//! ```toml
//! local_timezone = "Europe/Paris"
//!
//! [[calendars]]
//! id = "work"
//! url = "https://example.com/work.ics"
//! fetch_interval_secs = 600
//! excluded_events = ["Lunch", { filter_by = "Standup", until = "1 day" }]
//! auth = { method = "basic", user = "me", pass = "env::WORK_CAL_PASSWORD" }
//!
//! [[feeds]]
//! url = "https://example.com/rss.xml"
//!
//! [[chats]]
//! bot_token = "pass::telegram/bot"
//! chat_id = "123456"
//! ```
//!
//! Passwords, tokens and bot tokens accept secret references (see
//! [`secret`](crate::secret)).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use feedwatch_core::{ExclusionFilter, ExclusionRule};
use feedwatch_providers::calendar::{DEFAULT_MAX_ENTRIES, DEFAULT_MAX_WINDOW_DAYS};
use feedwatch_providers::chat::{DEFAULT_MAX_MESSAGES, DEFAULT_UPDATE_INTERVAL};
use feedwatch_providers::news::DEFAULT_ENCODING;
use feedwatch_providers::{Auth, ChatOptions, NewsOptions, NormalizeOptions};
use feedwatch_server::{CalendarSource, DEFAULT_RELOAD_INTERVAL, NewsSource, ServerConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::secret;

const REDACTED: &str = "***";

/// Configuration for the feedwatch client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User agent sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// IANA zone used for day boundaries; the system zone when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_timezone: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    pub calendars: Vec<CalendarSettings>,
    pub feeds: Vec<FeedSettings>,
    pub chats: Vec<ChatSettings>,
}

/// One `[[calendars]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    pub id: String,
    pub url: String,
    pub fetch_interval_secs: u64,
    /// Cap on published events; `0` removes the cap.
    pub maximum_entries: usize,
    pub maximum_number_of_days: u32,
    pub broadcast_past_events: bool,
    pub self_signed_cert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
    pub excluded_events: Vec<ExclusionRule>,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            id: "calendar".to_string(),
            url: String::new(),
            fetch_interval_secs: DEFAULT_RELOAD_INTERVAL.as_secs(),
            maximum_entries: DEFAULT_MAX_ENTRIES,
            maximum_number_of_days: DEFAULT_MAX_WINDOW_DAYS,
            broadcast_past_events: false,
            self_signed_cert: false,
            auth: None,
            excluded_events: Vec::new(),
        }
    }
}

impl CalendarSettings {
    /// Builds the registration, resolving credentials and compiling the
    /// exclusion rules. Invalid rules are skipped with a warning.
    pub fn to_source(&self, zone: Tz) -> ClientResult<CalendarSource> {
        let max_entries = (self.maximum_entries > 0).then_some(self.maximum_entries);
        let options = NormalizeOptions::default()
            .with_exclusions(ExclusionFilter::lenient(&self.excluded_events))
            .with_past_events(self.broadcast_past_events)
            .with_max_entries(max_entries)
            .with_max_window_days(self.maximum_number_of_days)
            .with_local_zone(zone);

        let mut source = CalendarSource::new(&self.id, &self.url)
            .with_fetch_interval(Duration::from_secs(self.fetch_interval_secs))
            .with_self_signed_cert(self.self_signed_cert)
            .with_options(options);
        if let Some(ref auth) = self.auth {
            source = source.with_auth(resolve_auth(auth)?);
        }
        Ok(source)
    }
}

/// One `[[feeds]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub url: String,
    pub encoding: String,
    pub reload_interval_secs: u64,
    pub log_feed_warnings: bool,
    pub use_cors_proxy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            encoding: DEFAULT_ENCODING.to_string(),
            reload_interval_secs: DEFAULT_RELOAD_INTERVAL.as_secs(),
            log_feed_warnings: false,
            use_cors_proxy: true,
            auth: None,
        }
    }
}

impl FeedSettings {
    pub fn to_source(&self) -> ClientResult<NewsSource> {
        let options = NewsOptions {
            encoding: self.encoding.clone(),
            log_feed_warnings: self.log_feed_warnings,
            use_cors_proxy: self.use_cors_proxy,
        };
        let mut source = NewsSource::new(&self.url)
            .with_reload_interval(Duration::from_secs(self.reload_interval_secs))
            .with_options(options);
        if let Some(ref auth) = self.auth {
            source = source.with_auth(resolve_auth(auth)?);
        }
        Ok(source)
    }
}

/// One `[[chats]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub bot_token: String,
    pub chat_id: String,
    pub update_interval_secs: u64,
    pub max_messages: usize,
    /// Bot API base URL, for self-hosted API servers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            update_interval_secs: DEFAULT_UPDATE_INTERVAL.as_secs(),
            max_messages: DEFAULT_MAX_MESSAGES,
            api_base: None,
        }
    }
}

impl ChatSettings {
    pub fn to_options(&self) -> ClientResult<ChatOptions> {
        let token = secret::resolve(&self.bot_token)?;
        let mut options = ChatOptions::new(token, &self.chat_id)
            .with_update_interval(Duration::from_secs(self.update_interval_secs))
            .with_max_messages(self.max_messages);
        if let Some(ref base) = self.api_base {
            options = options.with_api_base(base);
        }
        Ok(options)
    }
}

fn resolve_auth(auth: &Auth) -> ClientResult<Auth> {
    Ok(match auth {
        Auth::Basic { user, pass } => Auth::basic(secret::resolve(user)?, secret::resolve(pass)?),
        Auth::Bearer { token } => Auth::bearer(secret::resolve(token)?),
    })
}

fn redact_auth(auth: &mut Option<Auth>) {
    let redact = |value: &str| {
        if secret::is_reference(value) {
            value.to_string()
        } else {
            REDACTED.to_string()
        }
    };
    *auth = auth.as_ref().map(|auth| match auth {
        Auth::Basic { user, pass } => Auth::basic(user, redact(pass)),
        Auth::Bearer { token } => Auth::bearer(redact(token)),
    });
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults when the file
    /// does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedwatch")
    }

    pub fn source_count(&self) -> usize {
        self.calendars.len() + self.feeds.len() + self.chats.len()
    }

    /// Zone used for day boundaries: the configured one, else the system
    /// zone, else UTC.
    pub fn local_zone(&self) -> ClientResult<Tz> {
        if let Some(ref name) = self.local_timezone {
            return name
                .parse()
                .map_err(|e| ClientError::Config(format!("invalid local_timezone '{name}': {e}")));
        }
        match iana_time_zone::get_timezone() {
            Ok(name) => Ok(name.parse().unwrap_or_else(|_| {
                debug!(zone = %name, "Unknown system time zone, using UTC");
                Tz::UTC
            })),
            Err(e) => {
                debug!("Cannot determine system time zone, using UTC: {e}");
                Ok(Tz::UTC)
            }
        }
    }

    /// Registry settings derived from this configuration.
    pub fn server_config(&self, background_timers: bool) -> ServerConfig {
        let mut config = ServerConfig::default()
            .with_background_timers(background_timers)
            .with_channel_capacity((self.source_count() * 4).max(64));
        if let Some(ref user_agent) = self.user_agent {
            config = config.with_user_agent(user_agent);
        }
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Checks everything that can be checked without network access.
    /// Secret references are not followed.
    pub fn validate(&self) -> ClientResult<()> {
        self.local_zone()?;

        if self.user_agent.as_deref().is_some_and(str::is_empty) {
            return Err(ClientError::Config("user_agent must not be empty".into()));
        }

        for calendar in &self.calendars {
            check_url("calendar", &calendar.url)?;
            if calendar.id.is_empty() {
                return Err(ClientError::Config(format!(
                    "calendar {} has an empty id",
                    calendar.url
                )));
            }
            ExclusionFilter::compile(&calendar.excluded_events).map_err(|e| {
                ClientError::Config(format!("calendar '{}': {e}", calendar.id))
            })?;
        }

        for feed in &self.feeds {
            check_url("feed", &feed.url)?;
        }

        for chat in &self.chats {
            if chat.bot_token.is_empty() || chat.chat_id.is_empty() {
                return Err(ClientError::Config(
                    "chats need both bot_token and chat_id".into(),
                ));
            }
        }

        Ok(())
    }

    /// A copy safe to print: plain-text secrets are masked, references kept.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for calendar in &mut config.calendars {
            redact_auth(&mut calendar.auth);
        }
        for feed in &mut config.feeds {
            redact_auth(&mut feed.auth);
        }
        for chat in &mut config.chats {
            if !secret::is_reference(&chat.bot_token) {
                chat.bot_token = REDACTED.to_string();
            }
        }
        config
    }
}

fn check_url(kind: &str, url: &str) -> ClientResult<()> {
    url::Url::parse(url)
        .map(|_| ())
        .map_err(|e| ClientError::Config(format!("malformed {kind} url '{url}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
local_timezone = "Europe/Paris"
user_agent = "feedwatch-test/1.0"

[[calendars]]
id = "work"
url = "https://example.com/work.ics"
fetch_interval_secs = 30
maximum_entries = 0
excluded_events = ["Lunch", { filter_by = "^standup", regex = true, until = "2 hours" }]
auth = { method = "basic", user = "me", pass = "hunter2" }

[[feeds]]
url = "https://example.com/rss.xml"
encoding = "ISO-8859-1"

[[chats]]
bot_token = "123:ABC"
chat_id = "42"
"#;

    fn sample() -> ClientConfig {
        toml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn parses_every_section() {
        let config = sample();
        assert_eq!(config.source_count(), 3);

        let calendar = &config.calendars[0];
        assert_eq!(calendar.id, "work");
        assert_eq!(calendar.fetch_interval_secs, 30);
        assert_eq!(calendar.maximum_number_of_days, DEFAULT_MAX_WINDOW_DAYS);
        assert_eq!(calendar.excluded_events.len(), 2);
        assert_eq!(calendar.excluded_events[0], ExclusionRule::from("Lunch"));
        assert_eq!(calendar.auth, Some(Auth::basic("me", "hunter2")));

        assert_eq!(config.feeds[0].encoding, "ISO-8859-1");
        assert_eq!(config.feeds[0].reload_interval_secs, 300);
        assert_eq!(config.chats[0].max_messages, DEFAULT_MAX_MESSAGES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_is_valid() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.source_count(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn to_source_carries_options() {
        let config = sample();
        let zone = config.local_zone().unwrap();
        assert_eq!(zone, chrono_tz::Europe::Paris);

        let source = config.calendars[0].to_source(zone).unwrap();
        assert_eq!(source.key(), "workhttps://example.com/work.ics");
        assert_eq!(source.options.max_entries, None);
        assert_eq!(source.options.local_zone, chrono_tz::Europe::Paris);
        assert_eq!(source.options.exclusions.len(), 2);

        let news = config.feeds[0].to_source().unwrap();
        assert_eq!(news.options.encoding, "ISO-8859-1");

        let chat = config.chats[0].to_options().unwrap();
        assert_eq!(chat.chat_id, "42");
        assert_eq!(chat.update_interval, DEFAULT_UPDATE_INTERVAL);
    }

    #[test]
    fn validation_errors() {
        let mut config = sample();
        config.local_timezone = Some("Mars/Olympus".to_string());
        assert!(config.validate().is_err());

        let mut config = sample();
        config.feeds[0].url = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("malformed feed url"));

        let mut config = sample();
        config.calendars[0].excluded_events = vec![ExclusionRule::Rule(feedwatch_core::RuleSpec {
            filter_by: "(".to_string(),
            regex: true,
            case_sensitive: false,
            until: None,
        })];
        assert!(config.validate().is_err());

        let mut config = sample();
        config.chats[0].chat_id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn redaction_keeps_references() {
        let mut config = sample();
        config.feeds[0].auth = Some(Auth::bearer("env::FEED_TOKEN"));
        let redacted = config.redacted();

        assert_eq!(redacted.calendars[0].auth, Some(Auth::basic("me", REDACTED)));
        assert_eq!(redacted.feeds[0].auth, Some(Auth::bearer("env::FEED_TOKEN")));
        assert_eq!(redacted.chats[0].bot_token, REDACTED);

        let dumped = toml::to_string_pretty(&redacted).unwrap();
        assert!(!dumped.contains("hunter2"));
        assert!(!dumped.contains("123:ABC"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        assert_eq!(config.calendars[0].id, "work");
    }

    #[test]
    fn load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = ClientConfig::load_from(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[[calendars]\n").unwrap();
        let err = ClientConfig::load_from(&broken).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn server_config_follows_settings() {
        let mut config = sample();
        config.request_timeout_secs = Some(5);
        let server = config.server_config(false);
        assert!(!server.background_timers);
        assert_eq!(server.user_agent.as_deref(), Some("feedwatch-test/1.0"));
        assert_eq!(server.request_timeout, Duration::from_secs(5));
        assert_eq!(server.channel_capacity, 64);
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        let path = ClientConfig::default_path();
        assert!(path.ends_with("feedwatch/config.toml"));
    }
}
