//! The `Feed` trait.
//!
//! A feed wraps a [`Transport`](crate::http::Transport) and turns each
//! successful response into a list of items. Scheduling lives outside: the
//! caller awaits [`Feed::poll`], publishes the update, and sleeps for
//! [`FeedUpdate::next_delay`] before polling again.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;

use crate::error::FeedResult;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of one poll.
#[derive(Debug)]
pub struct FeedUpdate<T> {
    /// The feed's complete current item list, or the classified failure.
    pub result: FeedResult<Vec<T>>,
    /// Delay before the next poll.
    pub next_delay: Duration,
}

impl<T> FeedUpdate<T> {
    pub fn new(result: FeedResult<Vec<T>>, next_delay: Duration) -> Self {
        Self { result, next_delay }
    }
}

/// A polled remote source.
pub trait Feed: Send + 'static {
    /// Item type handed to consumers.
    type Item: Clone + Serialize + Send + Sync + 'static;

    /// Identity of the source, used in logs and error reports.
    fn url(&self) -> &str;

    /// Current base interval between polls.
    fn reload_interval(&self) -> Duration;

    /// Shortens the reload interval when `interval` is faster.
    ///
    /// Returns true when the interval changed. The default never changes it.
    fn set_reload_interval(&mut self, _interval: Duration) -> bool {
        false
    }

    /// Whether an empty item list should still be published.
    fn publishes_empty(&self) -> bool {
        true
    }

    /// Fetches once and returns the resulting items.
    fn poll(&mut self) -> BoxFuture<'_, FeedUpdate<Self::Item>>;
}
