//! Recurrence expansion.
//!
//! A recurring entry is turned into concrete instances for a search range
//! derived from the display window. Each occurrence is keyed with
//! [`date_key`] and looked up in the entry's override map (replace) and in
//! the exception set of the resulting event (drop).

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use feedwatch_core::{TimeWindow, date_key, end_of_day, local_midnight, saturating_add};
use rrule::RRuleSet;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::entry::{EntryTime, RawEventEntry};

/// Upper bound on occurrences evaluated per entry.
const MAX_OCCURRENCES: u16 = 1000;

/// Rules starting before this year are moved to it.
const MIN_RULE_YEAR: i32 = 1900;

/// Errors raised while expanding a recurring entry.
#[derive(Debug, Error)]
pub enum RecurrenceError {
    #[error("entry has no recurrence rule")]
    NotRecurring,

    #[error("entry has no start")]
    MissingStart,

    #[error("invalid recurrence rule '{rule}': {source}")]
    InvalidRule {
        rule: String,
        #[source]
        source: rrule::RRuleError,
    },
}

/// One concrete occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedInstance<'a> {
    /// The entry providing title and metadata: the override when one
    /// matched, the recurring entry otherwise.
    pub event: &'a RawEventEntry,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub recurring: bool,
}

/// Expands `entry` into the occurrences relevant for `window`.
///
/// The range searched is `window` widened by `duration` (at least a day) on
/// the past side and by one day on the future side, so occurrences that
/// started earlier but are still running are found. Instances are returned
/// in rule order; the caller applies the window itself.
pub fn expand<'a>(
    entry: &'a RawEventEntry,
    window: &TimeWindow,
    duration: Duration,
    local: Tz,
) -> Result<Vec<ExpandedInstance<'a>>, RecurrenceError> {
    let rule = entry.rrule.as_deref().ok_or(RecurrenceError::NotRecurring)?;
    let start = entry.start.ok_or(RecurrenceError::MissingStart)?;
    let full_day = entry.is_full_day(local);
    let event_zone = start.zone(local);

    let source = rule_source(&start, rule, local);
    trace!(source = %source, "Evaluating recurrence");
    let rule_set: RRuleSet = source.parse().map_err(|source| RecurrenceError::InvalidRule {
        rule: rule.to_string(),
        source,
    })?;

    let range = window.widened(duration);
    let tz: rrule::Tz = Utc.into();
    let after = saturating_add(range.start, -Duration::seconds(1)).with_timezone(&tz);
    let before = saturating_add(range.end, Duration::seconds(1)).with_timezone(&tz);
    let occurrences = rule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if occurrences.limited {
        debug!(uid = ?entry.uid, "Recurrence expansion hit the occurrence limit");
    }

    let mut instances = Vec::with_capacity(occurrences.dates.len());
    for occurrence in &occurrences.dates {
        let occurrence_start = occurrence.with_timezone(&Utc);
        if occurrence_start < range.start || occurrence_start > range.end {
            continue;
        }

        // Full-day occurrences are rebuilt from their calendar date so a
        // zone offset cannot move them to the neighbouring day.
        let instance_start = if full_day {
            local_midnight(occurrence.date_naive(), event_zone)
        } else {
            occurrence_start
        };
        let key = date_key(instance_start, full_day, local);

        let bounds = match entry.overrides.get(&key) {
            Some(replacement) => {
                trace!(key = %key, "Using override");
                override_bounds(replacement, instance_start, duration, local)
                    .map(|(start, end)| (replacement, start, end))
            }
            None => instance_start
                .checked_add_signed(duration)
                .map(|end| (entry, instance_start, end)),
        };
        let Some((event, start, mut end)) = bounds else {
            warn!(uid = ?entry.uid, key = %key, "Skipping occurrence whose end is out of range");
            continue;
        };

        if event.exceptions.contains(&key) {
            trace!(key = %key, "Skipping excluded occurrence");
            continue;
        }

        if full_day && start == end {
            end = end_of_day(end, local);
        }

        instances.push(ExpandedInstance {
            event,
            start,
            end,
            recurring: true,
        });
    }

    Ok(instances)
}

/// Start and end of an override. A missing end falls back to the
/// override's own duration, then to the recurring entry's duration.
///
/// `None` when that end cannot be represented.
fn override_bounds(
    replacement: &RawEventEntry,
    occurrence_start: DateTime<Utc>,
    duration: Duration,
    local: Tz,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = replacement
        .start
        .map_or(occurrence_start, |time| time.instant(local));
    let end = match (replacement.end, replacement.duration) {
        (Some(end), _) => end.instant(local),
        (None, Some(own)) => start.checked_add_signed(own)?,
        (None, None) => start.checked_add_signed(duration)?,
    };
    Some((start, end))
}

/// Builds the `DTSTART`/`RRULE` text the rule parser expects.
///
/// Date-only starts become UTC midnight and floating starts are pinned to
/// `local`. Years before 1900 are clamped to 1900.
fn rule_source(start: &EntryTime, rule: &str, local: Tz) -> String {
    let dtstart = match *start {
        EntryTime::Date(date) => format!("DTSTART:{}T000000Z", clamp_year(date).format("%Y%m%d")),
        EntryTime::Utc(dt) => {
            let naive = dt.naive_utc();
            let naive = clamp_year(naive.date()).and_time(naive.time());
            format!("DTSTART:{}Z", naive.format("%Y%m%dT%H%M%S"))
        }
        EntryTime::Zoned { local: naive, tz } => {
            let naive = clamp_year(naive.date()).and_time(naive.time());
            format!("DTSTART;TZID={}:{}", tz.name(), naive.format("%Y%m%dT%H%M%S"))
        }
        EntryTime::Floating(naive) => {
            let naive = clamp_year(naive.date()).and_time(naive.time());
            format!("DTSTART;TZID={}:{}", local.name(), naive.format("%Y%m%dT%H%M%S"))
        }
    };

    format!("{dtstart}\nRRULE:{}", normalize_until(rule))
}

fn clamp_year(date: NaiveDate) -> NaiveDate {
    if date.year() >= MIN_RULE_YEAR {
        return date;
    }
    date.with_year(MIN_RULE_YEAR)
        .or_else(|| NaiveDate::from_ymd_opt(MIN_RULE_YEAR, date.month(), 28))
        .unwrap_or(date)
}

/// Rewrites `UNTIL` as a UTC date-time, which the rule parser requires for
/// zoned starts. A bare date means the end of that day.
fn normalize_until(rule: &str) -> String {
    rule.split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                let value = value.trim();
                if value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()) {
                    format!("UNTIL={value}T235959Z")
                } else if value.ends_with('Z') {
                    format!("UNTIL={value}")
                } else {
                    format!("UNTIL={value}Z")
                }
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
