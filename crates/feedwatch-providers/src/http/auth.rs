//! Authorization header construction.

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Credentials sent with every request of a source.
///
/// Deserializes from `{ method = "basic", user, pass }` or
/// `{ method = "bearer", token }` (`pass` is accepted for the token too).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Auth {
    Basic { user: String, pass: String },
    Bearer {
        #[serde(alias = "pass")]
        token: String,
    },
}

impl Auth {
    pub fn basic(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self::Basic {
            user: user.into(),
            pass: pass.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        match self {
            Self::Basic { user, pass } => basic_auth(user, pass),
            Self::Bearer { token } => format!("Bearer {token}"),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("pass", &"***")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}

/// Creates a Basic authentication header value.
pub fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{username}:{password}");
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
    format!("Basic {encoded}")
}
