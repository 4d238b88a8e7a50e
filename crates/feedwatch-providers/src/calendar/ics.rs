//! ICS parsing into a [`CalendarDocument`].
//!
//! VEVENTs are grouped by UID. A component carrying `RECURRENCE-ID` becomes
//! an override on its master, and `EXDATE` values become the master's
//! exception set. Both are keyed with [`date_key`] using the master's
//! full-day flag, the same key the expander computes for each occurrence.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use feedwatch_core::{Geo, date_key};
use icalendar::parser::{Component, Property, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, trace};

use super::entry::{CalendarDocument, EntryKind, EntryTime, RawEventEntry};

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-])?P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("duration regex should be valid")
});

/// Errors raised while reading an ICS document.
#[derive(Debug, Error)]
pub enum IcsError {
    #[error("malformed calendar: {0}")]
    Malformed(String),

    #[error("no VCALENDAR found")]
    NoCalendar,
}

/// Parses ICS text. Floating and date-only times are keyed in `local`.
pub fn parse_ics(content: &str, local: Tz) -> Result<CalendarDocument, IcsError> {
    if !content.contains("BEGIN:VCALENDAR") {
        return Err(IcsError::NoCalendar);
    }

    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| IcsError::Malformed(e.to_string()))?;

    let mut components = Vec::new();
    collect_components(&calendar.components, &mut components);

    // Masters first, so overrides and exceptions can be keyed with the
    // master's full-day flag.
    let mut entries: Vec<RawEventEntry> = Vec::new();
    let mut by_uid: HashMap<String, usize> = HashMap::new();
    let mut pending_overrides = Vec::new();

    for component in components {
        if component.name != "VEVENT" {
            entries.push(RawEventEntry::new(EntryKind::Other(component.name.to_string())));
            continue;
        }

        let entry = parse_vevent(component);
        match component.find_prop("RECURRENCE-ID").and_then(entry_time) {
            Some(recurrence_id) => pending_overrides.push((recurrence_id, entry)),
            None => {
                let exdates = component
                    .properties
                    .iter()
                    .filter(|p| p.name == "EXDATE")
                    .flat_map(parse_exdate_property)
                    .collect::<Vec<_>>();

                let mut entry = entry;
                let full_day = entry.is_full_day(local);
                entry.exceptions = exdates
                    .iter()
                    .map(|time| date_key(time.instant(local), full_day, local))
                    .collect();

                match entry.uid.clone() {
                    Some(uid) => match by_uid.get(&uid) {
                        Some(&index) => entries[index] = entry,
                        None => {
                            by_uid.insert(uid, entries.len());
                            entries.push(entry);
                        }
                    },
                    None => entries.push(entry),
                }
            }
        }
    }

    for (recurrence_id, entry) in pending_overrides {
        let master_index = entry.uid.as_ref().and_then(|uid| by_uid.get(uid).copied());

        match master_index {
            Some(index) => {
                let master = &mut entries[index];
                let key = date_key(recurrence_id.instant(local), master.is_full_day(local), local);
                trace!(uid = ?master.uid, key = %key, "Attaching override");
                master.overrides.insert(key, entry);
            }
            None => {
                debug!(uid = ?entry.uid, "Override without master, keeping as a single event");
                entries.push(entry);
            }
        }
    }

    Ok(CalendarDocument::new(entries))
}

/// Flattens nested `VCALENDAR` wrappers; `VALARM`s stay inside their event.
fn collect_components<'a>(components: &'a [Component<'a>], out: &mut Vec<&'a Component<'a>>) {
    for component in components {
        match component.name.as_ref() {
            "VCALENDAR" => collect_components(&component.components, out),
            "VTIMEZONE" => {}
            _ => out.push(component),
        }
    }
}

fn parse_vevent(component: &Component<'_>) -> RawEventEntry {
    let text = |name: &str| {
        component
            .find_prop(name)
            .map(|p| unescape_text(p.val.as_ref()))
            .filter(|s| !s.is_empty())
    };

    let mut entry = RawEventEntry::new(EntryKind::Event);
    entry.uid = text("UID");
    entry.summary = text("SUMMARY");
    entry.description = text("DESCRIPTION");
    entry.location = text("LOCATION");
    entry.class = text("CLASS");
    entry.geo = component.find_prop("GEO").and_then(|p| parse_geo(p.val.as_ref()));
    entry.start = component.find_prop("DTSTART").and_then(entry_time);
    entry.end = component.find_prop("DTEND").and_then(entry_time);
    entry.duration = component
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));
    entry.rrule = component
        .find_prop("RRULE")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|rule| !rule.is_empty());
    entry
}

/// Converts a date or date-time property.
///
/// A `TZID` that is not an IANA name (Windows names, custom `VTIMEZONE`
/// ids) is read as floating time.
fn entry_time(prop: &Property<'_>) -> Option<EntryTime> {
    let time = match DatePerhapsTime::try_from(prop).ok()? {
        DatePerhapsTime::Date(date) => EntryTime::Date(date),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => EntryTime::Utc(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => EntryTime::Floating(naive),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            zoned(date_time, &tzid)
        }
    };
    Some(time)
}

fn zoned(local: NaiveDateTime, tzid: &str) -> EntryTime {
    match tzid.trim_matches('"').parse::<Tz>() {
        Ok(tz) => EntryTime::Zoned { local, tz },
        Err(_) => {
            debug!(tzid = %tzid, "Unknown TZID, reading as floating time");
            EntryTime::Floating(local)
        }
    }
}

/// Parses an EXDATE property into its values.
///
/// Handles `VALUE=DATE`, a `TZID` parameter, UTC and floating values, and
/// comma-separated lists.
fn parse_exdate_property(prop: &Property<'_>) -> Vec<EntryTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date {
                return NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(EntryTime::Date);
            }
            match parse_ics_datetime(s)? {
                EntryTime::Floating(naive) => Some(match tzid {
                    Some(ref tz) => zoned(naive, tz),
                    None => EntryTime::Floating(naive),
                }),
                other => Some(other),
            }
        })
        .collect()
}

/// Parses a bare iCalendar value: `20250205`, `20250205T100000Z` or
/// `20250205T100000`.
pub fn parse_ics_datetime(s: &str) -> Option<EntryTime> {
    let s = s.trim();

    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(EntryTime::Date);
    }

    if let Some(utc) = s.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        return Some(EntryTime::Utc(Utc.from_utc_datetime(&naive)));
    }

    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
        .ok()
        .map(EntryTime::Floating)
}

/// Parses an RFC 5545 duration such as `PT1H30M`, `P1D` or `-P2W`.
///
/// Returns `None` when a component does not fit a `Duration`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let caps = DURATION_RE.captures(value.trim())?;
    let part = |i: usize| -> Option<i64> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };

    let duration = [
        Duration::try_weeks(part(2)?)?,
        Duration::try_days(part(3)?)?,
        Duration::try_hours(part(4)?)?,
        Duration::try_minutes(part(5)?)?,
        Duration::try_seconds(part(6)?)?,
    ]
    .iter()
    .try_fold(Duration::zero(), |total, component| total.checked_add(component))?;

    match caps.get(1).map(|m| m.as_str()) {
        Some("-") => Some(-duration),
        _ => Some(duration),
    }
}

/// Parses `GEO:<lat>;<lon>`.
fn parse_geo(value: &str) -> Option<Geo> {
    let (lat, lon) = value.split_once([';', ','])?;
    Some(Geo {
        lat: lat.trim().parse().ok()?,
        lon: lon.trim().parse().ok()?,
    })
}

/// Reverses RFC 5545 TEXT escaping.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
