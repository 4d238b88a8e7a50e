//! RSS 2.0, RSS 1.0 (RDF) and Atom parsing.
//!
//! The reader walks the document once. Inside an `<item>` or `<entry>`, the
//! text of every direct child (and its descendants) is collected under the
//! child's qualified, lowercased name; fields are picked from that map when
//! the item closes.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::escape::unescape_with;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use thiserror::Error;

use super::item::NewsItem;

const DESCRIPTION_FIELDS: [&str; 3] = ["description", "summary", "content"];
const PUBDATE_FIELDS: [&str; 5] = ["pubdate", "published", "updated", "dc:date", "a10:updated"];

/// Longest honoured `<ttl>`, in minutes.
const MAX_TTL_MINUTES: u64 = 24 * 60;

static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("break regex should be valid"));
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("image regex should be valid"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex should be valid"));

#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("not a feed: root element is <{0}>")]
    NotAFeed(String),

    #[error("document is empty")]
    Empty,
}

/// An item that lacked a title or a publication date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub title: Option<String>,
    pub description: Option<String>,
    pub pubdate: Option<String>,
}

/// Result of parsing one feed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub items: Vec<NewsItem>,
    pub skipped: Vec<SkippedItem>,
    /// Channel `<ttl>` in minutes, capped at one day.
    pub ttl_minutes: Option<u64>,
}

#[derive(Debug, Default)]
struct ItemFields {
    text: HashMap<String, String>,
    href: Option<String>,
    preferred_href: bool,
}

impl ItemFields {
    fn append(&mut self, field: &str, chunk: &str) {
        let value = self.text.entry(field.to_string()).or_default();
        if !value.is_empty() {
            value.push(' ');
        }
        value.push_str(chunk);
    }

    fn get(&self, field: &str) -> Option<&str> {
        self.text
            .get(field)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn first_of(&self, fields: &[&str]) -> Option<&str> {
        fields.iter().find_map(|field| self.get(field))
    }

    /// Atom links: the first `alternate` (or rel-less) link wins over any
    /// other relation.
    fn offer_link(&mut self, start: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in start.attributes().flatten() {
            let value = attr.unescape_value().map(Cow::into_owned).ok();
            match attr.key.as_ref() {
                b"href" => href = value,
                b"rel" => rel = value,
                _ => {}
            }
        }
        let Some(href) = href else {
            return;
        };
        let preferred = rel.as_deref().is_none_or(|rel| rel == "alternate");
        if self.href.is_none() || (preferred && !self.preferred_href) {
            self.href = Some(href);
            self.preferred_href = preferred;
        }
    }

    fn finish(self, use_cors_proxy: bool) -> Result<NewsItem, SkippedItem> {
        let title = self.get("title").map(str::to_string);
        let pubdate = self.first_of(&PUBDATE_FIELDS).map(str::to_string);
        let description = self.first_of(&DESCRIPTION_FIELDS).map(html_to_text);

        match (title, pubdate) {
            (Some(title), Some(pubdate)) => {
                let url = self
                    .get("url")
                    .or_else(|| self.get("link"))
                    .map(str::to_string)
                    .or(self.href)
                    .unwrap_or_default();
                Ok(NewsItem::new(
                    title,
                    description.unwrap_or_default(),
                    pubdate,
                    url,
                    use_cors_proxy,
                ))
            }
            (title, pubdate) => Err(SkippedItem {
                title,
                description,
                pubdate,
            }),
        }
    }
}

/// Parses an RSS or Atom document.
pub fn parse_feed(xml: &str, use_cors_proxy: bool) -> Result<ParsedFeed, FeedParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = ParsedFeed::default();
    let mut path: Vec<String> = Vec::new();
    let mut seen_root = false;
    // Index in `path` of the open item element.
    let mut item_at: Option<usize> = None;
    let mut fields = ItemFields::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = element_name(&e);
                if !seen_root {
                    check_root(&e)?;
                    seen_root = true;
                }
                path.push(name);
                match item_at {
                    None if is_item(&e) => {
                        item_at = Some(path.len() - 1);
                        fields = ItemFields::default();
                    }
                    Some(at) if path.len() == at + 2 && path[at + 1] == "link" => fields.offer_link(&e),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if !seen_root {
                    check_root(&e)?;
                    seen_root = true;
                }
                let direct_child = item_at.is_some_and(|at| path.len() == at + 1);
                if direct_child && element_name(&e) == "link" {
                    fields.offer_link(&e);
                }
            }
            Event::Text(e) => {
                let raw = String::from_utf8_lossy(&e);
                collect_text(&path, item_at, &mut fields, &mut feed, &decode_entities(&raw));
            }
            Event::CData(e) => {
                let raw = String::from_utf8_lossy(&e);
                collect_text(&path, item_at, &mut fields, &mut feed, &raw);
            }
            Event::End(_) => {
                if item_at.is_some_and(|at| at + 1 == path.len()) {
                    item_at = None;
                    match std::mem::take(&mut fields).finish(use_cors_proxy) {
                        Ok(item) => feed.items.push(item),
                        Err(skipped) => feed.skipped.push(skipped),
                    }
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(FeedParseError::Empty);
    }
    Ok(feed)
}

fn collect_text(path: &[String], item_at: Option<usize>, fields: &mut ItemFields, feed: &mut ParsedFeed, text: &str) {
    match item_at {
        Some(at) if path.len() > at + 1 => fields.append(&path[at + 1], text),
        Some(_) => {}
        None => {
            if path.len() >= 2 && path[path.len() - 2] == "channel" && path[path.len() - 1] == "ttl" {
                feed.ttl_minutes = text
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .map(|minutes| minutes.min(MAX_TTL_MINUTES));
            }
        }
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn is_item(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"item" | b"entry")
}

fn check_root(e: &BytesStart<'_>) -> Result<(), FeedParseError> {
    let local = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
    match local.as_str() {
        "rss" | "feed" | "rdf" => Ok(()),
        _ => Err(FeedParseError::NotAFeed(local)),
    }
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "euro" => "\u{20ac}",
        _ => return None,
    })
}

/// Decodes character references; text with unknown entities is kept as is.
fn decode_entities(raw: &str) -> Cow<'_, str> {
    unescape_with(raw, resolve_entity).unwrap_or(Cow::Borrowed(raw))
}

/// Reduces an HTML fragment to one line of text: line breaks become spaces,
/// images are dropped, other tags are stripped and whitespace is collapsed.
pub fn html_to_text(html: &str) -> String {
    let text = BREAK_RE.replace_all(html, " ");
    let text = IMAGE_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, " ");
    let text = decode_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
