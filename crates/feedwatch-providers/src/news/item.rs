use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One article of a news feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    /// Plain text; markup is stripped while parsing.
    pub description: String,
    /// Publication date exactly as the feed wrote it.
    pub pubdate: String,
    pub url: String,
    pub use_cors_proxy: bool,
    /// SHA-256 of `"<pubdate> :: <title> :: <url>"`, hex encoded.
    pub hash: String,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        pubdate: impl Into<String>,
        url: impl Into<String>,
        use_cors_proxy: bool,
    ) -> Self {
        let title = title.into();
        let pubdate = pubdate.into();
        let url = url.into();
        let hash = item_hash(&pubdate, &title, &url);
        Self {
            title,
            description: description.into(),
            pubdate,
            url,
            use_cors_proxy,
            hash,
        }
    }
}

fn item_hash(pubdate: &str, title: &str, url: &str) -> String {
    let digest = Sha256::digest(format!("{pubdate} :: {title} :: {url}").as_bytes());
    format!("{digest:x}")
}
