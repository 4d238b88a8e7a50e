use std::time::Duration;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{ErrorInfo, ErrorKind, FeedResult};

use super::config::SourceConfig;
use super::retry::RetryPolicy;

/// Outcome of one fetch attempt.
#[derive(Debug)]
pub struct Attempt {
    /// The successful response, or the classified failure.
    pub outcome: FeedResult<Response>,
    /// Delay before the next attempt, already clamped.
    pub next_delay: Duration,
}

/// HTTP transport for a single source.
///
/// `fetch` takes `&mut self`, so one transport can never have two requests in
/// flight.
pub struct Transport {
    client: Client,
    config: SourceConfig,
    headers: HeaderMap,
    policy: RetryPolicy,
    /// Shown in logs and errors instead of the URL when set.
    label: Option<String>,
}

impl Transport {
    /// Creates a transport for the given source.
    pub fn new(config: SourceConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ErrorInfo::network(format!("Failed to create HTTP client: {e}"))
                    .with_url(config.url_str())
                    .with_source(e)
            })?;

        let headers = request_headers(&config);
        let policy = RetryPolicy::new(config.reload_interval, config.max_retries);

        Ok(Self {
            client,
            config,
            headers,
            policy,
            label: None,
        })
    }

    /// Reports the source as `label` instead of its URL, for URLs that
    /// embed credentials.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The label if one is set, otherwise the URL.
    pub fn identity(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.config.url_str())
    }

    pub fn url(&self) -> &Url {
        &self.config.url
    }

    /// Points the transport at a new URL (used for cursor-style APIs).
    pub fn set_url(&mut self, url: Url) {
        self.config.url = url;
    }

    pub fn reload_interval(&self) -> Duration {
        self.policy.reload_interval()
    }

    pub fn set_reload_interval(&mut self, interval: Duration) {
        self.config.reload_interval = interval;
        self.policy.set_reload_interval(interval);
    }

    pub fn server_error_count(&self) -> u32 {
        self.policy.server_error_count()
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Performs one GET and classifies the result.
    pub async fn fetch(&mut self) -> Attempt {
        let url = self.identity().to_string();
        trace!(url = %url, "Sending request");

        let result = self
            .client
            .get(self.config.url.clone())
            .headers(self.headers.clone())
            .send()
            .await;

        let (outcome, requested) = match result {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, status = %response.status(), "Fetch succeeded");
                self.policy.on_success();
                (Ok(response), None)
            }
            Ok(response) => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok());
                let err = self
                    .policy
                    .on_status(response.status().as_u16(), retry_after, Utc::now())
                    .with_url(url.as_str());

                if err.kind() == ErrorKind::RateLimited {
                    warn!(url = %url, delay_ms = err.retry_after().as_millis() as u64, "{}", err.message());
                } else {
                    error!(url = %url, delay_ms = err.retry_after().as_millis() as u64, "{}", err.message());
                }

                let delay = err.retry_after();
                (Err(err), Some(delay))
            }
            Err(e) => {
                let e = if self.label.is_some() { e.without_url() } else { e };
                let message = if e.is_timeout() {
                    self.timeout_message()
                } else {
                    format!("Network error: {e}")
                };
                error!(url = %url, "{message}");

                let err = self
                    .policy
                    .on_network_error(message)
                    .with_url(url.as_str())
                    .with_source(e);
                let delay = err.retry_after();
                (Err(err), Some(delay))
            }
        };

        Attempt {
            outcome,
            next_delay: self.policy.schedule_delay(requested),
        }
    }

    /// A failure while reading the body of a successful response.
    pub fn body_error(&self, e: reqwest::Error) -> ErrorInfo {
        let e = if self.label.is_some() { e.without_url() } else { e };
        let message = if e.is_timeout() {
            self.timeout_message()
        } else {
            format!("Failed to read response body: {e}")
        };
        error!(url = self.identity(), "{message}");

        self.policy
            .on_network_error(message)
            .with_url(self.identity())
            .with_source(e)
    }

    fn timeout_message(&self) -> String {
        format!("Request timeout after {}ms", self.config.timeout.as_millis())
    }

    /// An error raised after a successful response, retried at the reload
    /// interval.
    pub fn error(&self, kind: ErrorKind, message: impl Into<String>) -> ErrorInfo {
        ErrorInfo::new(kind, message)
            .with_retry_after(self.policy.reload_interval())
            .with_url(self.identity())
    }

    /// A `PARSE_ERROR` for the current source.
    pub fn parse_error(&self, message: impl Into<String>) -> ErrorInfo {
        self.error(ErrorKind::ParseError, message)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("url", &self.identity())
            .field("reload_interval", &self.policy.reload_interval())
            .field("server_error_count", &self.policy.server_error_count())
            .finish()
    }
}

/// Custom headers first, then `Authorization` so credentials always win.
fn request_headers(config: &SourceConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in &config.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Ignoring invalid request header"),
        }
    }

    if let Some(ref auth) = config.auth {
        match HeaderValue::from_str(&auth.header_value()) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!(url = %config.url, "Credentials are not a valid header value"),
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Auth;

    #[test]
    fn authorization_overrides_custom_header() {
        let config = SourceConfig::new("https://example.com/")
            .unwrap()
            .with_header("Authorization", "Token nope")
            .with_header("X-Trace", "1")
            .with_auth(Auth::bearer("secret"));

        let headers = request_headers(&config);
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
        assert_eq!(headers["x-trace"], "1");
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let config = SourceConfig::new("https://example.com/")
            .unwrap()
            .with_header("Bad Header", "x")
            .with_header("X-Ok", "fine");

        let headers = request_headers(&config);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn parse_error_uses_reload_interval() {
        let transport = Transport::new(
            SourceConfig::new("https://example.com/cal.ics")
                .unwrap()
                .with_reload_interval(Duration::from_secs(120)),
        )
        .unwrap();

        let err = transport.parse_error("iCal parsing failed: bad");
        assert_eq!(err.kind(), ErrorKind::ParseError);
        assert_eq!(err.retry_after(), Duration::from_secs(120));
        assert_eq!(err.retry_count(), 0);
        assert_eq!(err.url(), "https://example.com/cal.ics");
    }

    #[test]
    fn label_replaces_url_in_errors() {
        let transport = Transport::new(SourceConfig::new("https://api.example.com/botSECRET/getUpdates").unwrap())
            .unwrap()
            .with_label("telegram:42");

        let err = transport.error(ErrorKind::UnknownError, "boom");
        assert_eq!(err.url(), "telegram:42");
        assert!(!format!("{transport:?}").contains("SECRET"));
    }
}
