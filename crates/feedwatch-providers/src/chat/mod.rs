//! Bot chat messages (Telegram Bot API `getUpdates`).

mod feed;
mod types;

pub use feed::{ChatFeed, ChatOptions, DEFAULT_API_BASE, DEFAULT_MAX_MESSAGES, DEFAULT_UPDATE_INTERVAL};
pub use types::ChatMessage;
