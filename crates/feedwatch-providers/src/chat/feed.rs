//! Chat feed: poll a bot's `getUpdates` and keep the latest text messages
//! of one chat.

use std::time::Duration;

use tracing::{debug, error, info};
use url::Url;

use crate::error::{ErrorInfo, ErrorKind, FeedResult};
use crate::feed::{BoxFuture, Feed, FeedUpdate};
use crate::http::{MIN_SCHEDULE_DELAY, SourceConfig, Transport};

use super::types::{ChatMessage, UpdatesResponse};

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Default delay between polls.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of messages kept.
pub const DEFAULT_MAX_MESSAGES: usize = 5;

/// Options of a chat feed.
#[derive(Clone, PartialEq, Eq)]
pub struct ChatOptions {
    pub bot_token: String,
    pub chat_id: String,
    pub update_interval: Duration,
    pub max_messages: usize,
    pub api_base: String,
    pub user_agent: Option<String>,
}

impl ChatOptions {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            max_messages: DEFAULT_MAX_MESSAGES,
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: None,
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Name used in logs and errors in place of the token-bearing URL.
    pub fn label(&self) -> String {
        format!("telegram:{}", self.chat_id)
    }
}

impl std::fmt::Debug for ChatOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOptions")
            .field("bot_token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .field("update_interval", &self.update_interval)
            .field("max_messages", &self.max_messages)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// A polled bot chat.
pub struct ChatFeed {
    transport: Transport,
    options: ChatOptions,
    endpoint: Url,
    last_update_id: i64,
    messages: Vec<ChatMessage>,
}

impl ChatFeed {
    pub fn new(options: ChatOptions) -> FeedResult<Self> {
        let endpoint = format!(
            "{}/bot{}/getUpdates",
            options.api_base.trim_end_matches('/'),
            options.bot_token
        );
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            ErrorInfo::client(format!("Invalid chat API endpoint: {e}"))
                .with_url(options.label())
                .with_source(e)
        })?;

        let mut config = SourceConfig::from_url(endpoint.clone())
            .with_reload_interval(options.update_interval.max(MIN_SCHEDULE_DELAY));
        if let Some(ref user_agent) = options.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        let transport = Transport::new(config)?.with_label(options.label());

        Ok(Self {
            transport,
            options,
            endpoint,
            last_update_id: 0,
            messages: Vec::new(),
        })
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_update_id(&self) -> i64 {
        self.last_update_id
    }

    fn updates_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("offset", &(self.last_update_id + 1).to_string())
            .append_pair("limit", &self.options.max_messages.to_string())
            .append_pair("timeout", "0");
        url
    }

    /// Folds a `getUpdates` body into the message list.
    fn apply(&mut self, body: &str) -> FeedResult<Vec<ChatMessage>> {
        let response: UpdatesResponse = serde_json::from_str(body).map_err(|e| {
            self.transport
                .parse_error(format!("Failed to parse chat response: {e}"))
                .with_source(e)
        })?;

        if !response.ok {
            let description = response.description.as_deref().unwrap_or("Unknown error");
            return Err(self
                .transport
                .error(ErrorKind::UnknownError, format!("Telegram API error: {description}")));
        }

        let mut fresh = Vec::new();
        for update in &response.result {
            let Some(message) = update.message.as_ref() else {
                continue;
            };
            let Some(chat_message) = ChatMessage::from_message(message) else {
                continue;
            };
            self.last_update_id = self.last_update_id.max(update.update_id);
            if message.chat.id.to_string() == self.options.chat_id {
                fresh.push(chat_message);
            }
        }

        if !fresh.is_empty() {
            info!(url = self.transport.identity(), count = fresh.len(), "Fetched new chat messages");
            fresh.append(&mut self.messages);
            fresh.truncate(self.options.max_messages);
            self.messages = fresh;
        }

        debug!(
            url = self.transport.identity(),
            messages = self.messages.len(),
            last_update_id = self.last_update_id,
            "Chat updated"
        );
        Ok(self.messages.clone())
    }
}

impl std::fmt::Debug for ChatFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatFeed")
            .field("transport", &self.transport)
            .field("options", &self.options)
            .field("last_update_id", &self.last_update_id)
            .field("messages", &self.messages.len())
            .finish()
    }
}

impl Feed for ChatFeed {
    type Item = ChatMessage;

    fn url(&self) -> &str {
        self.transport.identity()
    }

    fn reload_interval(&self) -> Duration {
        self.transport.reload_interval()
    }

    fn set_reload_interval(&mut self, interval: Duration) -> bool {
        if interval > MIN_SCHEDULE_DELAY && interval < self.transport.reload_interval() {
            self.transport.set_reload_interval(interval);
            return true;
        }
        false
    }

    fn poll(&mut self) -> BoxFuture<'_, FeedUpdate<ChatMessage>> {
        Box::pin(async move {
            let url = self.updates_url();
            self.transport.set_url(url);

            let attempt = self.transport.fetch().await;
            let result = match attempt.outcome {
                Ok(response) => match response.text().await {
                    Ok(body) => self.apply(&body).inspect_err(|err| {
                        error!(url = err.url(), "{}", err.message());
                    }),
                    Err(e) => Err(self.transport.body_error(e)),
                },
                Err(err) => Err(err),
            };
            FeedUpdate::new(result, attempt.next_delay)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> ChatFeed {
        ChatFeed::new(ChatOptions::new("123:SECRET", "42").with_max_messages(3)).unwrap()
    }

    fn update(id: i64, chat: i64, text: Option<&str>) -> String {
        let text = text.map_or(String::new(), |t| format!(r#","text":"{t}""#));
        format!(
            r#"{{"update_id":{id},"message":{{"message_id":{id},"date":1700000000,"chat":{{"id":{chat}}},"from":{{"first_name":"Ada","last_name":"Lovelace"}}{text}}}}}"#
        )
    }

    fn body(updates: &[String]) -> String {
        format!(r#"{{"ok":true,"result":[{}]}}"#, updates.join(","))
    }

    #[test]
    fn url_carries_offset_and_limit() {
        let mut feed = feed();
        assert_eq!(
            feed.updates_url().as_str(),
            "https://api.telegram.org/bot123:SECRET/getUpdates?offset=1&limit=3&timeout=0"
        );

        feed.apply(&body(&[update(7, 42, Some("hi"))])).unwrap();
        assert!(feed.updates_url().as_str().contains("offset=8"));
    }

    #[test]
    fn keeps_text_messages_of_the_chat_newest_first() {
        let mut feed = feed();
        let messages = feed
            .apply(&body(&[
                update(1, 42, Some("one")),
                update(2, 99, Some("elsewhere")),
                update(3, 42, None),
                update(4, 42, Some("two")),
            ]))
            .unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(messages[0].sender, "Ada Lovelace");
        assert_eq!(messages[0].date, 1_700_000_000_000);
        // The other chat's update still advances the offset; the textless one does not.
        assert_eq!(feed.last_update_id(), 4);

        let messages = feed
            .apply(&body(&[update(5, 42, Some("three")), update(6, 42, Some("four"))]))
            .unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["three", "four", "one"]);
    }

    #[test]
    fn empty_result_keeps_messages() {
        let mut feed = feed();
        feed.apply(&body(&[update(1, 42, Some("one"))])).unwrap();
        let messages = feed.apply(r#"{"ok":true,"result":[]}"#).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(feed.publishes_empty());
    }

    #[test]
    fn api_error() {
        let err = feed()
            .apply(r#"{"ok":false,"description":"Unauthorized"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownError);
        assert_eq!(err.message(), "Telegram API error: Unauthorized");
        assert_eq!(err.url(), "telegram:42");

        let err = feed().apply(r#"{"ok":false}"#).unwrap_err();
        assert_eq!(err.message(), "Telegram API error: Unknown error");
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = feed().apply("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
        assert!(!err.to_string().contains("SECRET"));
    }

    #[test]
    fn sender_fallbacks() {
        let mut feed = feed();
        let body = r#"{"ok":true,"result":[
            {"update_id":1,"message":{"message_id":1,"date":1,"chat":{"id":42},"text":"anon"}},
            {"update_id":2,"message":{"message_id":2,"date":1,"chat":{"id":42},"text":"first","from":{"first_name":"Grace"}}}
        ]}"#;
        let messages = feed.apply(body).unwrap();
        assert_eq!(messages[0].sender, "Unknown");
        assert_eq!(messages[1].sender, "Grace");
    }

    #[test]
    fn interval_rules() {
        let feed_slow = ChatFeed::new(ChatOptions::new("t", "1").with_update_interval(Duration::from_millis(5))).unwrap();
        assert_eq!(feed_slow.reload_interval(), MIN_SCHEDULE_DELAY);

        let mut feed = feed();
        assert_eq!(feed.reload_interval(), DEFAULT_UPDATE_INTERVAL);
        assert!(!feed.set_reload_interval(Duration::from_secs(120)));
        assert!(feed.set_reload_interval(Duration::from_secs(30)));
        assert_eq!(feed.reload_interval(), Duration::from_secs(30));
    }

    #[test]
    fn debug_hides_token() {
        let options = ChatOptions::new("123:SECRET", "42");
        assert!(!format!("{options:?}").contains("SECRET"));
        assert!(!format!("{:?}", feed()).contains("SECRET"));
    }
}
