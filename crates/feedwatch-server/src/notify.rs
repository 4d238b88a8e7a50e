//! Notifications sent to consumers.

use std::collections::BTreeMap;
use std::sync::Arc;

use feedwatch_core::DisplayEvent;
use feedwatch_providers::{ChatMessage, ErrorReport, NewsItem};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// A message on the notification channel.
///
/// Serialized with a `type` tag (`CALENDAR_EVENTS`, `NEWS_ITEMS`, ...) and
/// camelCase fields.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Notification {
    /// The normalized event list of one calendar.
    CalendarEvents {
        id: String,
        url: String,
        events: Arc<Vec<DisplayEvent>>,
        checksum: String,
    },
    /// A failed calendar fetch. The report carries the URL.
    CalendarError {
        id: String,
        #[serde(flatten)]
        error: ErrorReport,
    },
    /// Items of every registered news feed, keyed by URL.
    NewsItems {
        feeds: BTreeMap<String, Arc<Vec<NewsItem>>>,
    },
    NewsError {
        #[serde(flatten)]
        error: ErrorReport,
    },
    /// Latest messages of one chat, newest first.
    ChatMessages {
        chat_id: String,
        messages: Arc<Vec<ChatMessage>>,
        checksum: String,
    },
    ChatError {
        chat_id: String,
        #[serde(flatten)]
        error: ErrorReport,
    },
}

impl Notification {
    /// Wire name of the notification.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CalendarEvents { .. } => "CALENDAR_EVENTS",
            Self::CalendarError { .. } => "CALENDAR_ERROR",
            Self::NewsItems { .. } => "NEWS_ITEMS",
            Self::NewsError { .. } => "NEWS_ERROR",
            Self::ChatMessages { .. } => "CHAT_MESSAGES",
            Self::ChatError { .. } => "CHAT_ERROR",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::CalendarError { .. } | Self::NewsError { .. } | Self::ChatError { .. }
        )
    }
}

/// Sending side of the notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Sends to every current subscriber; a channel without subscribers
    /// drops the notification.
    pub fn send(&self, notification: Notification) {
        let name = notification.name();
        match self.tx.send(notification) {
            Ok(receivers) => trace!(notification = name, receivers, "Notification sent"),
            Err(_) => debug!(notification = name, "No subscribers, notification dropped"),
        }
    }
}
