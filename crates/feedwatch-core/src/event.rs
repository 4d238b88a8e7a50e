//! The display projection of a calendar event.
//!
//! [`DisplayEvent`] is what downstream consumers receive: flat, already
//! windowed, with instants as epoch milliseconds. Field names serialize in
//! camelCase to keep the wire shape stable for existing consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic position from a calendar entry's `GEO` property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub lat: f64,
    pub lon: f64,
}

/// A single displayable event occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEvent {
    pub title: String,
    /// Start as milliseconds since the Unix epoch.
    pub start_date: i64,
    /// End as milliseconds since the Unix epoch.
    pub end_date: i64,
    pub full_day_event: bool,
    pub recurring_event: bool,
    /// Access class (`PUBLIC`, `PRIVATE`, `CONFIDENTIAL`).
    pub class: Option<String>,
    /// Year of the entry's first occurrence, not of this instance.
    pub first_year: i32,
    pub location: Option<String>,
    pub geo: Option<Geo>,
    pub description: Option<String>,
}

impl DisplayEvent {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_date)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.end_date)
    }

    /// True if `now` falls inside `[start, end)`.
    pub fn is_ongoing_at(&self, now: DateTime<Utc>) -> bool {
        let now = now.timestamp_millis();
        self.start_date <= now && now < self.end_date
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_date - self.start_date
    }
}
