//! RSS and Atom news feeds.

mod feed;
mod item;
mod parse;

pub use feed::{DEFAULT_ENCODING, NewsFeed, NewsOptions};
pub use item::NewsItem;
pub use parse::{FeedParseError, ParsedFeed, SkippedItem, html_to_text, parse_feed};
