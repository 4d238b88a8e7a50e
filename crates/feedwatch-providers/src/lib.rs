//! Remote feeds for feedwatch.
//!
//! - [`http`] - the polling transport: one GET at a time, error
//!   classification, adaptive retry delays
//! - [`calendar`] - ICS parsing, recurrence expansion and normalization into
//!   [`DisplayEvent`](feedwatch_core::DisplayEvent)s
//! - [`news`] - RSS and Atom feeds
//! - [`chat`] - Telegram bot updates
//!
//! # Architecture
//!
//! ```text
//!            ┌─────────────┐
//!            │  Transport  │  fetch + RetryPolicy
//!            └──────┬──────┘
//!     ┌─────────────┼──────────────┐
//!     ▼             ▼              ▼
//! CalendarFeed   NewsFeed      ChatFeed
//!     │
//!     ▼ parse_ics()
//! CalendarDocument
//!     │
//!     ▼ normalize()  (expand + window + exclusions)
//! Vec<DisplayEvent>
//! ```
//!
//! Every feed implements [`Feed`]; its errors are [`ErrorInfo`]s carrying the
//! delay before the next attempt.

pub mod calendar;
pub mod chat;
pub mod error;
pub mod feed;
pub mod http;
pub mod news;

pub use calendar::{CalendarDocument, CalendarFeed, NormalizeOptions, RawEventEntry};
pub use chat::{ChatFeed, ChatMessage, ChatOptions};
pub use error::{ErrorInfo, ErrorKind, ErrorReport, FeedResult};
pub use feed::{BoxFuture, Feed, FeedUpdate};
pub use http::{Attempt, Auth, SourceConfig, Transport};
pub use news::{NewsFeed, NewsItem, NewsOptions};
