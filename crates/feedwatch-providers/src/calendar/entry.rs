//! Raw calendar entries as parsed from a document.
//!
//! A [`RawEventEntry`] keeps times exactly as written (date, UTC, zoned or
//! floating); resolution to instants happens during normalization, where the
//! local zone is known.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use feedwatch_core::{Geo, local_midnight, resolve_local};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// UID fragment of the one producer whose yearly birthdays cannot be expanded.
const FACEBOOK_UID_MARKER: &str = "@facebook.com";

/// Title used when an entry has neither summary nor description.
pub const DEFAULT_TITLE: &str = "Event";

/// A start or end time as written in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTime {
    /// A date without time of day.
    Date(NaiveDate),
    /// An absolute instant.
    Utc(DateTime<Utc>),
    /// A wall-clock time in a known zone.
    Zoned { local: NaiveDateTime, tz: Tz },
    /// A wall-clock time with no zone; read in the local zone.
    Floating(NaiveDateTime),
}

impl EntryTime {
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// The entry's own zone, or `local` when it has none.
    pub fn zone(&self, local: Tz) -> Tz {
        match self {
            Self::Zoned { tz, .. } => *tz,
            _ => local,
        }
    }

    /// Resolves to an instant. Dates resolve to midnight in `local`.
    pub fn instant(&self, local: Tz) -> DateTime<Utc> {
        match *self {
            Self::Date(date) => local_midnight(date, local),
            Self::Utc(dt) => dt,
            Self::Zoned { local: naive, tz } => resolve_local(naive, tz),
            Self::Floating(naive) => resolve_local(naive, local),
        }
    }
}

/// Component type of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Event,
    /// Any other component (`VTODO`, `VJOURNAL`, ...); never displayed.
    Other(String),
}

/// One entry of a calendar document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEventEntry {
    pub kind: EntryKind,
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub geo: Option<Geo>,
    /// Access class (`PUBLIC`, `PRIVATE`, `CONFIDENTIAL`).
    pub class: Option<String>,
    pub start: Option<EntryTime>,
    pub end: Option<EntryTime>,
    pub duration: Option<Duration>,
    /// The `RRULE` value, without the property name.
    pub rrule: Option<String>,
    /// Replacement entries keyed by occurrence date key.
    pub overrides: BTreeMap<String, RawEventEntry>,
    /// Suppressed occurrence date keys.
    pub exceptions: BTreeSet<String>,
}

impl RawEventEntry {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            uid: None,
            summary: None,
            description: None,
            location: None,
            geo: None,
            class: None,
            start: None,
            end: None,
            duration: None,
            rrule: None,
            overrides: BTreeMap::new(),
            exceptions: BTreeSet::new(),
        }
    }

    /// A timed or dated event starting at `start`.
    pub fn event(start: EntryTime) -> Self {
        Self {
            start: Some(start),
            ..Self::new(EntryKind::Event)
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_end(mut self, end: EntryTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_rrule(mut self, rule: impl Into<String>) -> Self {
        self.rrule = Some(rule.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, entry: RawEventEntry) -> Self {
        self.overrides.insert(key.into(), entry);
        self
    }

    pub fn with_exception(mut self, key: impl Into<String>) -> Self {
        self.exceptions.insert(key.into());
        self
    }

    pub fn is_event(&self) -> bool {
        self.kind == EntryKind::Event
    }

    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some()
    }

    /// Summary, else description, else [`DEFAULT_TITLE`].
    pub fn title(&self) -> &str {
        self.summary
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.description.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(DEFAULT_TITLE)
    }

    /// Entries from this producer are shown as single one-day events.
    pub fn is_facebook_birthday(&self) -> bool {
        self.uid
            .as_deref()
            .is_some_and(|uid| uid.contains(FACEBOOK_UID_MARKER))
    }

    /// True for date-only starts, and for entries that start at local
    /// midnight and last a whole number of days.
    ///
    /// A missing end counts as the epoch, so a start-only entry qualifies
    /// when it sits on a UTC day boundary that is also local midnight.
    pub fn is_full_day(&self, local: Tz) -> bool {
        let Some(start) = self.start else {
            return false;
        };
        if start.is_date() {
            return true;
        }

        let start_at = start.instant(local);
        let end_ms = self.end.map_or(0, |end| end.instant(local).timestamp_millis());
        let span = end_ms - start_at.timestamp_millis();
        let local_start = start_at.with_timezone(&local);

        span % DAY_MS == 0 && local_start.hour() == 0 && local_start.minute() == 0
    }
}

/// A parsed calendar: entries in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarDocument {
    entries: Vec<RawEventEntry>,
}

impl CalendarDocument {
    pub fn new(entries: Vec<RawEventEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RawEventEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawEventEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RawEventEntry> for CalendarDocument {
    fn from_iter<I: IntoIterator<Item = RawEventEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
