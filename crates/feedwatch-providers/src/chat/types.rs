//! Bot API wire types.

use serde::{Deserialize, Serialize};

/// Response of `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatesResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub result: Vec<Update>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    /// Unix time in seconds.
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        }
    }
}

/// A chat message as published to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub sender: String,
    /// Milliseconds since the Unix epoch.
    pub date: i64,
    pub message_id: i64,
}

impl ChatMessage {
    /// Converts a text message; `None` for messages without text.
    pub fn from_message(message: &Message) -> Option<Self> {
        let text = message.text.clone()?;
        Some(Self {
            text,
            sender: message
                .from
                .as_ref()
                .map_or_else(|| "Unknown".to_string(), User::display_name),
            date: message.date * 1000,
            message_id: message.message_id,
        })
    }
}
