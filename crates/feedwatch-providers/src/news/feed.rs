//! News feed: fetch an RSS/Atom document and extract its items.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::FeedResult;
use crate::feed::{BoxFuture, Feed, FeedUpdate};
use crate::http::{MIN_SCHEDULE_DELAY, SourceConfig, Transport};

use super::item::NewsItem;
use super::parse::{ParsedFeed, parse_feed};

/// Default body encoding when the server does not name one.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Per-feed options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsOptions {
    /// Encoding label used when the response has no charset.
    pub encoding: String,
    /// Log items that are skipped for lack of a title or date.
    pub log_feed_warnings: bool,
    /// Copied onto every item for the display layer.
    pub use_cors_proxy: bool,
}

impl Default for NewsOptions {
    fn default() -> Self {
        Self {
            encoding: DEFAULT_ENCODING.to_string(),
            log_feed_warnings: false,
            use_cors_proxy: true,
        }
    }
}

/// A polled RSS or Atom feed.
#[derive(Debug)]
pub struct NewsFeed {
    transport: Transport,
    options: NewsOptions,
}

impl NewsFeed {
    /// Creates the feed. The interval is floored at one second and cache
    /// busting headers are added to the request.
    pub fn new(config: SourceConfig, options: NewsOptions) -> FeedResult<Self> {
        let interval = config.reload_interval.max(MIN_SCHEDULE_DELAY);
        let config = config
            .with_reload_interval(interval)
            .with_header("Cache-Control", "max-age=0, no-cache, no-store, must-revalidate")
            .with_header("Pragma", "no-cache");

        Ok(Self {
            transport: Transport::new(config)?,
            options,
        })
    }

    pub fn options(&self) -> &NewsOptions {
        &self.options
    }

    fn items_from(&mut self, body: &str) -> FeedResult<Vec<NewsItem>> {
        let parsed = parse_feed(body, self.options.use_cors_proxy).map_err(|e| {
            let err = self.transport.parse_error(format!("Feed parsing failed: {e}"));
            error!(url = self.transport.identity(), "{}", err.message());
            err.with_source(e)
        })?;
        Ok(self.apply(parsed))
    }

    fn apply(&mut self, parsed: ParsedFeed) -> Vec<NewsItem> {
        if self.options.log_feed_warnings {
            for skipped in &parsed.skipped {
                warn!(
                    url = self.transport.identity(),
                    title = ?skipped.title,
                    description = ?skipped.description,
                    pubdate = ?skipped.pubdate,
                    "Can't parse feed item"
                );
            }
        }

        if let Some(minutes) = parsed.ttl_minutes {
            let ttl = Duration::from_secs(minutes * 60);
            if ttl > self.transport.reload_interval() {
                self.transport.set_reload_interval(ttl);
                info!(
                    url = self.transport.identity(),
                    interval_ms = ttl.as_millis() as u64,
                    "Reload interval raised to feed ttl"
                );
            }
        }

        debug!(url = self.transport.identity(), items = parsed.items.len(), "Feed parsed");
        parsed.items
    }
}

impl Feed for NewsFeed {
    type Item = NewsItem;

    fn url(&self) -> &str {
        self.transport.identity()
    }

    fn reload_interval(&self) -> Duration {
        self.transport.reload_interval()
    }

    /// Only speeds the feed up, and never below one second.
    fn set_reload_interval(&mut self, interval: Duration) -> bool {
        if interval > MIN_SCHEDULE_DELAY && interval < self.transport.reload_interval() {
            self.transport.set_reload_interval(interval);
            return true;
        }
        false
    }

    fn publishes_empty(&self) -> bool {
        false
    }

    fn poll(&mut self) -> BoxFuture<'_, FeedUpdate<NewsItem>> {
        Box::pin(async move {
            let attempt = self.transport.fetch().await;
            let mut next_delay = attempt.next_delay;
            let result = match attempt.outcome {
                Ok(response) => match response.text_with_charset(&self.options.encoding).await {
                    Ok(body) => {
                        let items = self.items_from(&body);
                        if items.is_ok() {
                            // A ttl may have raised the interval.
                            next_delay = self.transport.reload_interval();
                        }
                        items
                    }
                    Err(e) => Err(self.transport.body_error(e)),
                },
                Err(err) => Err(err),
            };
            FeedUpdate::new(result, next_delay)
        })
    }
}
