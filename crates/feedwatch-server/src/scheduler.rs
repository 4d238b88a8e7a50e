//! Per-source scheduler.
//!
//! Each registered source runs in its own task:
//! - one fetch immediately on start
//! - afterwards a single timer, re-armed with the delay the feed returns
//! - commands to fetch now, re-broadcast the cached list, adjust the interval
//!   or stop
//!
//! Only one fetch is in flight per source: the task awaits each poll before
//! it looks at its timer or its commands again.

use std::time::Duration;

use feedwatch_providers::http::MIN_SCHEDULE_DELAY;
use feedwatch_providers::{ErrorInfo, Feed};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::{CacheEntry, SourceCache};

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Where a source delivers its results.
pub trait Publisher<T>: Send + Sync + 'static {
    /// Called with every list worth publishing, fresh or re-broadcast.
    fn publish(&self, entry: &CacheEntry<T>);

    /// Called when a fetch fails.
    fn publish_error(&self, error: &ErrorInfo);
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Re-arm the timer after each fetch.
    pub background_timers: bool,
    /// Capacity of the command channel.
    pub command_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            background_timers: true,
            command_buffer: 16,
        }
    }
}

impl SchedulerConfig {
    /// Builder: enable or disable background timers.
    pub fn with_background_timers(mut self, enabled: bool) -> Self {
        self.background_timers = enabled;
        self
    }
}

/// Commands that can be sent to a source task.
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    /// Cancel the pending timer and fetch now.
    FetchNow,
    /// Publish the cached list again without fetching.
    Rebroadcast,
    /// Offer a new reload interval; the feed decides whether to take it.
    SetReloadInterval(Duration),
    /// Stop the task.
    Stop,
}

/// State owned by the running task.
struct Source<F: Feed, P> {
    feed: F,
    publisher: P,
    cache: SourceCache<F::Item>,
    background_timers: bool,
    deadline: Option<Instant>,
    fetches: watch::Sender<u64>,
}

impl<F, P> Source<F, P>
where
    F: Feed,
    P: Publisher<F::Item>,
{
    async fn fetch(&mut self) {
        debug!(url = self.feed.url(), "Fetching");
        let update = self.feed.poll().await;

        match update.result {
            Ok(items) => {
                let silent = items.is_empty() && !self.feed.publishes_empty();
                let entry = self.cache.replace(items);
                if silent {
                    info!(url = self.feed.url(), "No items to broadcast yet");
                } else {
                    info!(
                        url = self.feed.url(),
                        items = entry.items.len(),
                        "Broadcasting items"
                    );
                    self.publisher.publish(&entry);
                }
            }
            Err(err) => {
                debug!(url = self.feed.url(), kind = %err.kind(), "Publishing fetch error");
                self.publisher.publish_error(&err);
            }
        }

        self.fetches.send_modify(|count| *count += 1);
        self.arm(update.next_delay);
    }

    fn arm(&mut self, delay: Duration) {
        if !self.background_timers {
            self.deadline = None;
            return;
        }
        let delay = delay.max(MIN_SCHEDULE_DELAY);
        debug!(
            url = self.feed.url(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Next fetch scheduled"
        );
        self.deadline = Some(deadline_after(delay));
    }

    fn rebroadcast(&self) {
        let Some(entry) = self.cache.snapshot() else {
            debug!(url = self.feed.url(), "Nothing fetched yet, skipping rebroadcast");
            return;
        };
        if entry.items.is_empty() && !self.feed.publishes_empty() {
            return;
        }
        info!(
            url = self.feed.url(),
            items = entry.items.len(),
            "Broadcasting cached items"
        );
        self.publisher.publish(&entry);
    }
}

/// Drives one feed.
pub struct Scheduler<F: Feed, P> {
    source: Source<F, P>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl<F, P> Scheduler<F, P>
where
    F: Feed,
    P: Publisher<F::Item>,
{
    /// Creates a scheduler for `feed`. Nothing is fetched until [`run`](Self::run).
    pub fn new(feed: F, publisher: P, config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (fetches, _) = watch::channel(0);
        Self {
            source: Source {
                feed,
                publisher,
                cache: SourceCache::new(),
                background_timers: config.background_timers,
                deadline: None,
                fetches,
            },
            command_tx,
            command_rx,
        }
    }

    /// Builder: write to an existing cache instead of a private one.
    pub fn with_cache(mut self, cache: SourceCache<F::Item>) -> Self {
        self.source.cache = cache;
        self
    }

    /// Returns a handle for sending commands to the task.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            fetches: self.source.fetches.subscribe(),
        }
    }

    /// The cache the task writes to.
    pub fn cache(&self) -> SourceCache<F::Item> {
        self.source.cache.clone()
    }

    /// Runs until stopped or until every handle is dropped.
    pub async fn run(self) {
        let Self {
            mut source,
            command_tx,
            mut command_rx,
        } = self;
        // Only handles keep the channel open.
        drop(command_tx);

        info!(
            url = source.feed.url(),
            interval_secs = source.feed.reload_interval().as_secs(),
            "Source started"
        );

        source.fetch().await;

        loop {
            let deadline = source.deadline;
            tokio::select! {
                () = wait_until(deadline) => {
                    source.fetch().await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::FetchNow) => {
                            debug!(url = source.feed.url(), "Received FetchNow command");
                            source.fetch().await;
                        }
                        Some(SchedulerCommand::Rebroadcast) => {
                            source.rebroadcast();
                        }
                        Some(SchedulerCommand::SetReloadInterval(interval)) => {
                            if source.feed.set_reload_interval(interval) {
                                info!(
                                    url = source.feed.url(),
                                    interval_secs = interval.as_secs(),
                                    "Reload interval shortened"
                                );
                            }
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!(url = source.feed.url(), "Source stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// `now + delay`, saturating at roughly thirty years out.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle for sending commands to a running source task.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    fetches: watch::Receiver<u64>,
}

impl SchedulerHandle {
    /// Cancels the pending timer and fetches immediately.
    pub async fn fetch_now(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::FetchNow).await
    }

    /// Publishes the cached list again.
    pub async fn rebroadcast(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Rebroadcast).await
    }

    /// Offers a new reload interval.
    pub async fn set_reload_interval(
        &self,
        interval: Duration,
    ) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx
            .send(SchedulerCommand::SetReloadInterval(interval))
            .await
    }

    /// Offers `interval`, re-broadcasts the cached list, then fetches.
    pub async fn refresh(
        &self,
        interval: Duration,
    ) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.set_reload_interval(interval).await?;
        self.rebroadcast().await?;
        self.fetch_now().await
    }

    /// Stops the task.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }

    /// Number of completed fetches, successful or not.
    pub fn fetch_count(&self) -> u64 {
        *self.fetches.borrow()
    }

    /// Waits until at least `count` fetches have completed. Returns early if
    /// the task is gone.
    pub async fn fetched(&self, count: u64) {
        let mut fetches = self.fetches.clone();
        let _ = fetches.wait_for(|done| *done >= count).await;
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}
