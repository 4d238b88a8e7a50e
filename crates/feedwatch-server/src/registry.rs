//! Source registry: creates sources on first registration and reuses them
//! afterwards.
//!
//! Keys:
//! - calendars: consumer id + URL
//! - news feeds: URL
//! - chats: bot token + chat id

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use feedwatch_core::DisplayEvent;
use feedwatch_providers::http::SourceConfig;
use feedwatch_providers::{
    CalendarFeed, ChatFeed, ChatMessage, ChatOptions, ErrorInfo, Feed, NewsFeed, NewsItem,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

use crate::cache::{CacheEntry, SourceCache};
use crate::config::{CalendarSource, MIN_CALENDAR_INTERVAL, NewsSource, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::notify::{Notification, Notifier};
use crate::scheduler::{Publisher, Scheduler, SchedulerConfig, SchedulerHandle};

type NewsCaches = Arc<RwLock<BTreeMap<String, SourceCache<NewsItem>>>>;

/// A running source.
struct Registered<T> {
    handle: SchedulerHandle,
    cache: SourceCache<T>,
    interval: Duration,
    task: JoinHandle<()>,
}

impl<T: serde::Serialize> Registered<T> {
    fn is_stale(&self) -> bool {
        self.cache.is_stale(self.interval)
    }
}

struct CalendarPublisher {
    id: String,
    url: String,
    notifier: Notifier,
}

impl Publisher<DisplayEvent> for CalendarPublisher {
    fn publish(&self, entry: &CacheEntry<DisplayEvent>) {
        self.notifier.send(Notification::CalendarEvents {
            id: self.id.clone(),
            url: self.url.clone(),
            events: Arc::clone(&entry.items),
            checksum: entry.checksum.clone(),
        });
    }

    fn publish_error(&self, error: &ErrorInfo) {
        error!(
            id = %self.id,
            url = error.url(),
            "Could not fetch calendar: {}",
            error.message()
        );
        self.notifier.send(Notification::CalendarError {
            id: self.id.clone(),
            error: error.report(),
        });
    }
}

/// Publishes the items of every news feed at once.
struct NewsPublisher {
    caches: NewsCaches,
    notifier: Notifier,
}

impl Publisher<NewsItem> for NewsPublisher {
    fn publish(&self, _entry: &CacheEntry<NewsItem>) {
        let feeds = self
            .caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(url, cache)| (url.clone(), cache.items()))
            .collect();
        self.notifier.send(Notification::NewsItems { feeds });
    }

    fn publish_error(&self, error: &ErrorInfo) {
        error!(url = error.url(), "Could not fetch newsfeed: {}", error.message());
        self.notifier.send(Notification::NewsError {
            error: error.report(),
        });
    }
}

struct ChatPublisher {
    chat_id: String,
    notifier: Notifier,
}

impl Publisher<ChatMessage> for ChatPublisher {
    fn publish(&self, entry: &CacheEntry<ChatMessage>) {
        self.notifier.send(Notification::ChatMessages {
            chat_id: self.chat_id.clone(),
            messages: Arc::clone(&entry.items),
            checksum: entry.checksum.clone(),
        });
    }

    fn publish_error(&self, error: &ErrorInfo) {
        error!(chat_id = %self.chat_id, "Could not fetch chat messages: {}", error.message());
        self.notifier.send(Notification::ChatError {
            chat_id: self.chat_id.clone(),
            error: error.report(),
        });
    }
}

/// Owns every running source and the notification channel.
pub struct Registry {
    config: ServerConfig,
    notifier: Notifier,
    calendars: HashMap<String, Registered<DisplayEvent>>,
    news: HashMap<String, Registered<NewsItem>>,
    news_caches: NewsCaches,
    chats: HashMap<String, Registered<ChatMessage>>,
}

impl Registry {
    pub fn new(config: ServerConfig) -> Self {
        let notifier = Notifier::new(config.channel_capacity);
        Self {
            config,
            notifier,
            calendars: HashMap::new(),
            news: HashMap::new(),
            news_caches: Arc::new(RwLock::new(BTreeMap::new())),
            chats: HashMap::new(),
        }
    }

    /// Subscribes to notifications. Only notifications sent after the call
    /// are received.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of running sources.
    pub fn len(&self) -> usize {
        self.calendars.len() + self.news.len() + self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default().with_background_timers(self.config.background_timers)
    }

    fn start<F, P>(&self, feed: F, publisher: P, cache: SourceCache<F::Item>) -> Registered<F::Item>
    where
        F: Feed,
        P: Publisher<F::Item>,
    {
        let interval = feed.reload_interval();
        let scheduler =
            Scheduler::new(feed, publisher, self.scheduler_config()).with_cache(cache.clone());
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run());
        Registered {
            handle,
            cache,
            interval,
            task,
        }
    }

    /// Registers a calendar.
    ///
    /// A new calendar starts fetching at once. An already registered one
    /// fetches if its data is older than its interval and re-broadcasts its
    /// cached events otherwise.
    pub async fn add_calendar(&mut self, source: CalendarSource) -> ServerResult<()> {
        let url = Url::parse(&source.url).map_err(|e| {
            error!(url = %source.url, "Malformed calendar url: {e}");
            ServerError::malformed_url(&source.url, e)
        })?;
        let key = source.key();

        if let Some(existing) = self.calendars.get(&key) {
            info!(url = %source.url, "Use existing calendar source");
            let sent = if existing.is_stale() {
                info!(url = %source.url, "Calendar data is stale, fetching fresh data");
                existing.handle.fetch_now().await
            } else {
                existing.handle.rebroadcast().await
            };
            return sent.map_err(|_| ServerError::stopped(key));
        }

        let mut interval = source.fetch_interval;
        if interval < MIN_CALENDAR_INTERVAL {
            warn!(
                url = %source.url,
                "fetch interval must be >= {} s",
                MIN_CALENDAR_INTERVAL.as_secs()
            );
            interval = MIN_CALENDAR_INTERVAL;
        }
        info!(
            url = %source.url,
            interval_secs = interval.as_secs(),
            "Create new calendar source"
        );

        let mut config = SourceConfig::from_url(url).with_reload_interval(interval);
        if let Some(auth) = source.auth {
            config = config.with_auth(auth);
        }
        if source.self_signed_cert {
            config = config.with_insecure_tls();
        }
        let feed = CalendarFeed::new(self.config.apply(config), source.options)?;

        let publisher = CalendarPublisher {
            id: source.id,
            url: source.url,
            notifier: self.notifier.clone(),
        };
        let registered = self.start(feed, publisher, SourceCache::new());
        self.calendars.insert(key, registered);
        Ok(())
    }

    /// Fetches a registered calendar now.
    pub async fn fetch_calendar(&self, id: &str, url: &str) -> ServerResult<()> {
        let key = format!("{id}{url}");
        let Some(existing) = self.calendars.get(&key) else {
            error!(key = %key, "No calendar source exists with key");
            return Err(ServerError::unknown_source(key));
        };
        existing
            .handle
            .fetch_now()
            .await
            .map_err(|_| ServerError::stopped(key))
    }

    /// Last published events of a calendar.
    pub fn calendar_events(&self, id: &str, url: &str) -> Option<CacheEntry<DisplayEvent>> {
        self.calendars
            .get(&format!("{id}{url}"))
            .and_then(|source| source.cache.snapshot())
    }

    /// Reload interval a calendar was started with.
    pub fn calendar_interval(&self, id: &str, url: &str) -> Option<Duration> {
        self.calendars
            .get(&format!("{id}{url}"))
            .map(|source| source.interval)
    }

    /// Registers a news feed.
    ///
    /// An already registered feed may only get a shorter interval; it
    /// re-broadcasts and then fetches.
    pub async fn add_news(&mut self, source: NewsSource) -> ServerResult<()> {
        let url = Url::parse(&source.url).map_err(|e| {
            error!(url = %source.url, "Malformed newsfeed url: {e}");
            ServerError::malformed_url(&source.url, e)
        })?;
        let key = source.url.clone();

        if let Some(existing) = self.news.get(&key) {
            info!(url = %source.url, "Use existing news source");
            return existing
                .handle
                .refresh(source.reload_interval)
                .await
                .map_err(|_| ServerError::stopped(key));
        }

        info!(
            url = %source.url,
            interval_secs = source.reload_interval.as_secs(),
            "Create new news source"
        );
        let mut config = SourceConfig::from_url(url).with_reload_interval(source.reload_interval);
        if let Some(auth) = source.auth {
            config = config.with_auth(auth);
        }
        let feed = NewsFeed::new(self.config.apply(config), source.options)?;

        // The cache joins the aggregate before the first fetch can publish.
        let cache = SourceCache::new();
        self.news_caches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), cache.clone());
        let publisher = NewsPublisher {
            caches: Arc::clone(&self.news_caches),
            notifier: self.notifier.clone(),
        };
        let registered = self.start(feed, publisher, cache);
        self.news.insert(key, registered);
        Ok(())
    }

    /// Items of every news feed, keyed by URL.
    pub fn news_items(&self) -> BTreeMap<String, Arc<Vec<NewsItem>>> {
        self.news_caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(url, cache)| (url.clone(), cache.items()))
            .collect()
    }

    /// Registers a chat.
    ///
    /// An already registered chat may only get a shorter interval; it
    /// re-broadcasts and then fetches.
    pub async fn add_chat(&mut self, options: ChatOptions) -> ServerResult<()> {
        if options.bot_token.is_empty() {
            error!("Missing chat bot token");
            return Err(ServerError::MissingCredentials { what: "bot token" });
        }
        if options.chat_id.is_empty() {
            error!("Missing chat id");
            return Err(ServerError::MissingCredentials { what: "chat id" });
        }
        let key = format!("{}_{}", options.bot_token, options.chat_id);

        if let Some(existing) = self.chats.get(&key) {
            info!(chat_id = %options.chat_id, "Use existing chat source");
            return existing
                .handle
                .refresh(options.update_interval)
                .await
                .map_err(|_| ServerError::stopped(options.label()));
        }

        info!(
            chat_id = %options.chat_id,
            interval_secs = options.update_interval.as_secs(),
            "Create new chat source"
        );
        let chat_id = options.chat_id.clone();
        let options = match (options.user_agent.is_none(), self.config.user_agent.as_ref()) {
            (true, Some(user_agent)) => options.with_user_agent(user_agent.clone()),
            _ => options,
        };
        let feed = ChatFeed::new(options)?;

        let publisher = ChatPublisher {
            chat_id,
            notifier: self.notifier.clone(),
        };
        let registered = self.start(feed, publisher, SourceCache::new());
        self.chats.insert(key, registered);
        Ok(())
    }

    /// Last published messages of a chat.
    pub fn chat_messages(&self, bot_token: &str, chat_id: &str) -> Option<CacheEntry<ChatMessage>> {
        self.chats
            .get(&format!("{bot_token}_{chat_id}"))
            .and_then(|source| source.cache.snapshot())
    }

    /// Waits until every source finished its first fetch.
    pub async fn settled(&self) {
        let handles = self
            .calendars
            .values()
            .map(|s| &s.handle)
            .chain(self.news.values().map(|s| &s.handle))
            .chain(self.chats.values().map(|s| &s.handle));
        for handle in handles {
            handle.fetched(1).await;
        }
    }

    /// Stops every source and waits for the tasks to end.
    pub async fn shutdown(self) {
        info!(sources = self.len(), "Stopping sources");
        let sources = self
            .calendars
            .into_values()
            .map(|s| (s.handle, s.task))
            .chain(self.news.into_values().map(|s| (s.handle, s.task)))
            .chain(self.chats.into_values().map(|s| (s.handle, s.task)));
        for (handle, task) in sources {
            // A task that already ended has nothing left to stop.
            let _ = handle.stop().await;
            if let Err(e) = task.await {
                warn!("Source task failed: {e}");
            }
        }
    }
}
