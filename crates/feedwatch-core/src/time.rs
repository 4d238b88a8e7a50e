//! Time helpers for calendar normalization.
//!
//! Everything here is pure: the local zone is always passed in, never read
//! from the process. The date-key function in particular is shared between
//! the calendar parser (when it indexes overrides and exceptions) and the
//! recurrence expander (when it looks them up), so both sides agree on which
//! calendar day an instant belongs to.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format of a date key: `YYYY-MM-DD`.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Returns the calendar-date key an instant is indexed under.
///
/// Full-day occurrences are keyed by their date in `zone`; timed occurrences
/// by their UTC date.
pub fn date_key(instant: DateTime<Utc>, full_day: bool, zone: Tz) -> String {
    if full_day {
        instant.with_timezone(&zone).format(DATE_KEY_FORMAT).to_string()
    } else {
        instant.format(DATE_KEY_FORMAT).to_string()
    }
}

/// Resolves a wall-clock time in `zone` to an instant.
///
/// Ambiguous times (DST fold) take the earlier instant. Times inside a DST
/// gap are pushed forward by the gap, the way wall clocks jump.
pub fn resolve_local(naive: NaiveDateTime, zone: Tz) -> DateTime<Utc> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => naive
            .checked_add_signed(Duration::hours(1))
            .and_then(|shifted| zone.from_local_datetime(&shifted).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// Midnight of `date` in `zone`.
pub fn local_midnight(date: NaiveDate, zone: Tz) -> DateTime<Utc> {
    resolve_local(date.and_time(NaiveTime::MIN), zone)
}

/// Start of the local day containing `instant`.
pub fn start_of_day(instant: DateTime<Utc>, zone: Tz) -> DateTime<Utc> {
    local_midnight(instant.with_timezone(&zone).date_naive(), zone)
}

/// Last millisecond of the local day containing `instant`.
pub fn end_of_day(instant: DateTime<Utc>, zone: Tz) -> DateTime<Utc> {
    let date = instant.with_timezone(&zone).date_naive();
    match date.succ_opt() {
        Some(next) => local_midnight(next, zone) - Duration::milliseconds(1),
        None => instant,
    }
}

/// `instant + delta`, clamped to the range `DateTime<Utc>` can represent.
pub fn saturating_add(instant: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    match instant.checked_add_signed(delta) {
        Some(shifted) => shifted,
        None if delta < Duration::zero() => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// The span of time events are kept for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Earliest end an event may have (inclusive).
    pub start: DateTime<Utc>,
    /// Latest start an event may have (inclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The display window for a calendar.
    ///
    /// The future edge is the start of today plus `max_days`, minus one
    /// second so events beginning exactly at that midnight stay out. The past
    /// edge is `now`, or the start of today minus `max_days` when past events
    /// are wanted.
    pub fn display(now: DateTime<Utc>, max_days: u32, include_past: bool, zone: Tz) -> Self {
        let today = start_of_day(now, zone);
        let days = Duration::days(i64::from(max_days));
        let start = if include_past {
            saturating_add(today, -days)
        } else {
            now
        };
        let end = saturating_add(saturating_add(today, days), -Duration::seconds(1));
        Self { start, end }
    }

    /// True when `[start, end]` touches the window.
    pub fn admits(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !(end < self.start || start > self.end)
    }

    /// The window widened for recurrence lookups.
    ///
    /// Occurrences that began up to `lead` before the window may still be
    /// running, so the lower edge moves back by `lead` (at least one day). The
    /// upper edge gains one day.
    pub fn widened(&self, lead: Duration) -> Self {
        let lead = lead.max(Duration::days(1));
        Self {
            start: saturating_add(self.start, -lead),
            end: saturating_add(self.end, Duration::days(1)),
        }
    }
}

/// Unit of a [`RelativeOffset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl OffsetUnit {
    fn parse(unit: &str) -> Option<Self> {
        let unit = unit.to_ascii_lowercase();
        let singular = unit.strip_suffix('s').unwrap_or(&unit);
        match singular {
            "second" => Some(Self::Seconds),
            "minute" => Some(Self::Minutes),
            "hour" => Some(Self::Hours),
            "day" => Some(Self::Days),
            "week" => Some(Self::Weeks),
            "month" => Some(Self::Months),
            "year" => Some(Self::Years),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Years => "years",
        }
    }
}

/// Error for an unparsable `"<integer> <unit>"` offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid offset '{0}', expected \"<integer> <unit>\"")]
pub struct OffsetParseError(pub String);

/// A span such as `"2 hours"` or `"1 week"`, measured back from an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeOffset {
    pub amount: u32,
    pub unit: OffsetUnit,
}

impl RelativeOffset {
    pub fn new(amount: u32, unit: OffsetUnit) -> Self {
        Self { amount, unit }
    }

    /// `instant` moved back by this offset. Month and year steps are
    /// calendar-aware and clamp to the end of shorter months.
    pub fn before(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let amount = i64::from(self.amount);
        let shifted = match self.unit {
            OffsetUnit::Seconds => instant.checked_sub_signed(Duration::seconds(amount)),
            OffsetUnit::Minutes => instant.checked_sub_signed(Duration::minutes(amount)),
            OffsetUnit::Hours => instant.checked_sub_signed(Duration::hours(amount)),
            OffsetUnit::Days => instant.checked_sub_signed(Duration::days(amount)),
            OffsetUnit::Weeks => instant.checked_sub_signed(Duration::weeks(amount)),
            OffsetUnit::Months => instant.checked_sub_months(Months::new(self.amount)),
            OffsetUnit::Years => self
                .amount
                .checked_mul(12)
                .and_then(|months| instant.checked_sub_months(Months::new(months))),
        };
        shifted.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl FromStr for RelativeOffset {
    type Err = OffsetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || OffsetParseError(s.to_string());
        let mut parts = s.split_whitespace();
        let amount = parts.next().and_then(|n| n.parse().ok()).ok_or_else(err)?;
        let unit = parts.next().and_then(OffsetUnit::parse).ok_or_else(err)?;
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self { amount, unit })
    }
}

impl fmt::Display for RelativeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit.as_str())
    }
}
