//! CalendarDocument to DisplayEvent conversion.
//!
//! For each event entry:
//! 1. Evaluate the exclusion filter on the entry title and skip excluded
//!    entries before any date work
//! 2. Resolve start, end and duration; full-day entries snap to the start of
//!    their day
//! 3. Expand recurring entries (except the birthday special case) or produce
//!    a single instance
//! 4. Keep instances that touch the display window and are not hidden by a
//!    rule's `until`
//!
//! The output is stable-sorted by start and truncated to `max_entries`.

use chrono::{DateTime, Datelike, Days, Duration, Utc};
use chrono_tz::Tz;
use feedwatch_core::{
    DisplayEvent, Exclusion, ExclusionFilter, TimeWindow, end_of_day, local_midnight, saturating_add,
    start_of_day,
};
use tracing::{debug, warn};

use super::entry::{CalendarDocument, RawEventEntry};
use super::recurrence::{ExpandedInstance, expand};

/// Default cap on the number of events returned.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Default number of days the display window spans.
pub const DEFAULT_MAX_WINDOW_DAYS: u32 = 365;

/// Options controlling [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub exclusions: ExclusionFilter,
    /// Extend the window `max_window_days` into the past.
    pub include_past_events: bool,
    /// Truncate the sorted output. `None` keeps everything.
    pub max_entries: Option<usize>,
    pub max_window_days: u32,
    /// Zone used for floating times, date-only entries and day boundaries.
    pub local_zone: Tz,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            exclusions: ExclusionFilter::default(),
            include_past_events: false,
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            max_window_days: DEFAULT_MAX_WINDOW_DAYS,
            local_zone: Tz::UTC,
        }
    }
}

impl NormalizeOptions {
    pub fn with_exclusions(mut self, exclusions: ExclusionFilter) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_past_events(mut self, include: bool) -> Self {
        self.include_past_events = include;
        self
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_window_days(mut self, days: u32) -> Self {
        self.max_window_days = days;
        self
    }

    pub fn with_local_zone(mut self, zone: Tz) -> Self {
        self.local_zone = zone;
        self
    }

    /// The display window at `now`.
    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::display(now, self.max_window_days, self.include_past_events, self.local_zone)
    }
}

/// Converts a document into the sorted list of events to display at `now`.
pub fn normalize(document: &CalendarDocument, options: &NormalizeOptions, now: DateTime<Utc>) -> Vec<DisplayEvent> {
    let window = options.window(now);
    let mut events = Vec::new();

    for entry in document.iter().filter(|entry| entry.is_event()) {
        let title = entry.title();
        let exclusion = options.exclusions.evaluate(title);
        if exclusion.excluded {
            debug!(title, "Entry excluded");
            continue;
        }
        normalize_entry(entry, &exclusion, &window, options, now, &mut events);
    }

    events.sort_by_key(|event| event.start_date);
    if let Some(max) = options.max_entries {
        events.truncate(max);
    }
    events
}

fn normalize_entry(
    entry: &RawEventEntry,
    exclusion: &Exclusion,
    window: &TimeWindow,
    options: &NormalizeOptions,
    now: DateTime<Utc>,
    out: &mut Vec<DisplayEvent>,
) {
    let local = options.local_zone;
    let Some(start_time) = entry.start else {
        debug!(uid = ?entry.uid, "Skipping entry without start");
        return;
    };

    let zone = start_time.zone(local);
    let birthday = entry.is_facebook_birthday();
    let full_day = birthday || entry.is_full_day(local);

    let mut start = start_time.instant(local);
    if full_day {
        start = start_of_day(start, zone);
    }
    let end = match (entry.end, entry.duration) {
        (Some(end), _) => end.instant(local),
        (None, Some(duration)) => match start.checked_add_signed(duration) {
            Some(end) => end,
            None => {
                warn!(uid = ?entry.uid, "Skipping entry whose duration runs out of range");
                return;
            }
        },
        (None, None) if birthday => next_day(start, zone),
        (None, None) => start,
    };
    let duration = end - start;

    let instances = if entry.is_recurring() && !birthday {
        match expand(entry, window, duration, local) {
            Ok(instances) => instances,
            Err(e) => {
                warn!(uid = ?entry.uid, error = %e, "Skipping entry with unusable recurrence");
                return;
            }
        }
    } else {
        let end = if full_day && start == end {
            end_of_day(end, zone)
        } else {
            end
        };
        vec![ExpandedInstance {
            event: entry,
            start,
            end,
            recurring: false,
        }]
    };

    let first_year = start_time.instant(local).with_timezone(&local).year();

    for instance in instances {
        if !window.admits(instance.start, instance.end) {
            continue;
        }
        if exclusion.hides_occurrence(now, instance.end) {
            debug!(title = instance.event.title(), "Occurrence hidden until closer to its end");
            continue;
        }
        out.push(display_event(entry, &instance, full_day, first_year));
    }
}

fn display_event(
    master: &RawEventEntry,
    instance: &ExpandedInstance<'_>,
    full_day: bool,
    first_year: i32,
) -> DisplayEvent {
    let event = instance.event;
    DisplayEvent {
        title: event.title().to_string(),
        start_date: instance.start.timestamp_millis(),
        end_date: instance.end.timestamp_millis(),
        full_day_event: full_day,
        recurring_event: instance.recurring,
        class: master.class.clone(),
        first_year,
        location: event.location.clone().or_else(|| master.location.clone()),
        geo: event.geo.or(master.geo),
        description: event.description.clone().or_else(|| master.description.clone()),
    }
}

/// Midnight of the following calendar day in `zone`.
fn next_day(start: DateTime<Utc>, zone: Tz) -> DateTime<Utc> {
    start
        .with_timezone(&zone)
        .date_naive()
        .checked_add_days(Days::new(1))
        .map_or(saturating_add(start, Duration::days(1)), |date| local_midnight(date, zone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::entry::EntryTime;
    use chrono::{NaiveDate, TimeZone};
    use feedwatch_core::{ExclusionRule, RuleSpec};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn timed(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> RawEventEntry {
        RawEventEntry::event(EntryTime::Utc(start))
            .with_summary(title)
            .with_end(EntryTime::Utc(end))
    }

    fn one_day_window() -> NormalizeOptions {
        NormalizeOptions::default()
            .with_past_events(true)
            .with_max_window_days(1)
            .with_max_entries(None)
    }

    fn titles(events: &[DisplayEvent]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    mod single_events {
        use super::*;

        #[test]
        fn lunch_end_to_end() {
            let t = utc(2024, 3, 10, 12, 0);
            let doc = CalendarDocument::new(vec![timed("Lunch", t, t + Duration::hours(1))]);

            let events = normalize(&doc, &one_day_window(), t);
            assert_eq!(events.len(), 1);
            let lunch = &events[0];
            assert_eq!(lunch.title, "Lunch");
            assert!(!lunch.full_day_event);
            assert!(!lunch.recurring_event);
            assert_eq!(lunch.start_date, t.timestamp_millis());
            assert_eq!(lunch.end_date, (t + Duration::hours(1)).timestamp_millis());
            assert_eq!(lunch.first_year, 2024);
        }

        #[test]
        fn midnight_to_midnight_is_full_day() {
            let doc = CalendarDocument::new(vec![timed("Holiday", utc(2024, 1, 1, 0, 0), utc(2024, 1, 2, 0, 0))]);

            let events = normalize(&doc, &NormalizeOptions::default(), utc(2024, 1, 1, 8, 0));
            assert_eq!(events.len(), 1);
            assert!(events[0].full_day_event);
            assert_eq!(events[0].end_date, utc(2024, 1, 2, 0, 0).timestamp_millis());
        }

        #[test]
        fn date_without_end_spans_its_day() {
            let entry = RawEventEntry::event(EntryTime::Date(date(2024, 1, 5))).with_summary("Offsite");
            let doc = CalendarDocument::new(vec![entry]);

            let events = normalize(&doc, &NormalizeOptions::default(), utc(2024, 1, 1, 8, 0));
            assert!(events[0].full_day_event);
            assert_eq!(events[0].start_date, utc(2024, 1, 5, 0, 0).timestamp_millis());
            assert_eq!(
                events[0].end_date,
                (utc(2024, 1, 6, 0, 0) - Duration::milliseconds(1)).timestamp_millis()
            );
        }

        #[test]
        fn duration_provides_end() {
            let t = utc(2024, 3, 10, 15, 0);
            let entry = RawEventEntry::event(EntryTime::Utc(t))
                .with_summary("Call")
                .with_duration(Duration::minutes(45));
            let doc = CalendarDocument::new(vec![entry]);

            let events = normalize(&doc, &one_day_window(), utc(2024, 3, 10, 9, 0));
            assert_eq!(events[0].end_date, (t + Duration::minutes(45)).timestamp_millis());
        }

        #[test]
        fn out_of_range_duration_skips_entry() {
            let t = utc(2024, 3, 10, 15, 0);
            let doc = CalendarDocument::new(vec![
                RawEventEntry::event(EntryTime::Utc(t))
                    .with_summary("Forever")
                    .with_duration(Duration::weeks(100_000_000)),
                timed("Call", t, t + Duration::hours(1)),
            ]);

            let events = normalize(&doc, &one_day_window(), utc(2024, 3, 10, 9, 0));
            assert_eq!(titles(&events), vec!["Call"]);
        }

        #[test]
        fn oversized_ics_durations_do_not_abort() {
            let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//feedwatch//test//EN\r\n\
                       BEGIN:VEVENT\r\nUID:huge\r\nSUMMARY:Huge\r\n\
                       DTSTART:20240310T150000Z\r\nDURATION:P100000000000000W\r\nEND:VEVENT\r\n\
                       BEGIN:VEVENT\r\nUID:long\r\nSUMMARY:Long\r\n\
                       DTSTART:20240310T150000Z\r\nDURATION:P100000000W\r\nEND:VEVENT\r\n\
                       END:VCALENDAR\r\n";
            let doc = crate::calendar::parse_ics(ics, Tz::UTC).unwrap();

            let events = normalize(&doc, &one_day_window(), utc(2024, 3, 10, 9, 0));
            // Without a usable duration the entry is a zero-length event.
            assert_eq!(titles(&events), vec!["Huge"]);
        }

        #[test]
        fn huge_window_still_normalizes() {
            let t = utc(2024, 3, 10, 15, 0);
            let doc = CalendarDocument::new(vec![timed("Call", t, t + Duration::hours(1))]);
            let options = NormalizeOptions::default()
                .with_past_events(true)
                .with_max_window_days(u32::MAX);

            let events = normalize(&doc, &options, utc(2024, 3, 10, 9, 0));
            assert_eq!(titles(&events), vec!["Call"]);
        }

        #[test]
        fn metadata_and_placeholder_title() {
            let t = utc(2024, 3, 10, 15, 0);
            let mut entry = RawEventEntry::event(EntryTime::Utc(t)).with_location("Room 4");
            entry.class = Some("PRIVATE".to_string());
            let doc = CalendarDocument::new(vec![entry]);

            let events = normalize(&doc, &one_day_window(), t);
            assert_eq!(events[0].title, "Event");
            assert_eq!(events[0].location.as_deref(), Some("Room 4"));
            assert_eq!(events[0].class.as_deref(), Some("PRIVATE"));
        }

        #[test]
        fn other_components_are_ignored() {
            let mut todo = timed("Todo", utc(2024, 3, 10, 15, 0), utc(2024, 3, 10, 16, 0));
            todo.kind = crate::calendar::entry::EntryKind::Other("VTODO".to_string());
            let doc = CalendarDocument::new(vec![todo]);

            assert!(normalize(&doc, &one_day_window(), utc(2024, 3, 10, 9, 0)).is_empty());
        }
    }

    mod window {
        use super::*;

        #[test]
        fn past_events_need_opt_in() {
            let now = utc(2024, 3, 10, 12, 0);
            let doc = CalendarDocument::new(vec![
                timed("Breakfast", utc(2024, 3, 10, 8, 0), utc(2024, 3, 10, 9, 0)),
                timed("Dinner", utc(2024, 3, 10, 19, 0), utc(2024, 3, 10, 20, 0)),
            ]);

            let future_only = NormalizeOptions::default().with_max_window_days(1);
            assert_eq!(titles(&normalize(&doc, &future_only, now)), vec!["Dinner"]);
            assert_eq!(titles(&normalize(&doc, &one_day_window(), now)), vec!["Breakfast", "Dinner"]);
        }

        #[test]
        fn ongoing_event_is_kept() {
            let now = utc(2024, 3, 10, 12, 0);
            let doc = CalendarDocument::new(vec![timed("Workshop", utc(2024, 3, 10, 11, 0), utc(2024, 3, 10, 13, 0))]);

            let options = NormalizeOptions::default().with_max_window_days(1);
            assert_eq!(titles(&normalize(&doc, &options, now)), vec!["Workshop"]);
        }

        #[test]
        fn next_midnight_edge_is_excluded() {
            let now = utc(2024, 3, 10, 12, 0);
            let doc = CalendarDocument::new(vec![
                timed("Late", utc(2024, 3, 10, 23, 0), utc(2024, 3, 10, 23, 30)),
                timed("Tomorrow", utc(2024, 3, 11, 0, 0), utc(2024, 3, 11, 1, 0)),
            ]);

            let options = NormalizeOptions::default().with_max_window_days(1);
            assert_eq!(titles(&normalize(&doc, &options, now)), vec!["Late"]);
        }

        #[test]
        fn sorted_and_truncated() {
            let now = utc(2024, 3, 10, 6, 0);
            let doc = CalendarDocument::new(vec![
                timed("C", utc(2024, 3, 10, 15, 0), utc(2024, 3, 10, 16, 0)),
                timed("A", utc(2024, 3, 10, 9, 0), utc(2024, 3, 10, 10, 0)),
                timed("B1", utc(2024, 3, 10, 12, 0), utc(2024, 3, 10, 13, 0)),
                timed("B2", utc(2024, 3, 10, 12, 0), utc(2024, 3, 10, 12, 30)),
            ]);

            let options = NormalizeOptions::default().with_max_window_days(1);
            assert_eq!(titles(&normalize(&doc, &options, now)), vec!["A", "B1", "B2", "C"]);

            let options = options.with_max_entries(Some(2));
            assert_eq!(titles(&normalize(&doc, &options, now)), vec!["A", "B1"]);
        }

        #[test]
        fn normalizing_twice_is_identical() {
            let now = utc(2024, 3, 10, 6, 0);
            let doc = CalendarDocument::new(vec![
                timed("One", utc(2024, 3, 12, 9, 0), utc(2024, 3, 12, 10, 0)),
                timed("Two", utc(2024, 3, 11, 9, 0), utc(2024, 3, 11, 10, 0)),
                RawEventEntry::event(EntryTime::Utc(utc(2024, 3, 4, 9, 0)))
                    .with_summary("Weekly")
                    .with_end(EntryTime::Utc(utc(2024, 3, 4, 10, 0)))
                    .with_rrule("FREQ=WEEKLY"),
            ]);
            let options = NormalizeOptions::default().with_max_window_days(30);

            assert_eq!(normalize(&doc, &options, now), normalize(&doc, &options, now));
        }
    }

    mod exclusions {
        use super::*;

        fn filter(rules: Vec<ExclusionRule>) -> ExclusionFilter {
            ExclusionFilter::compile(&rules).unwrap()
        }

        #[test]
        fn matching_entry_is_dropped() {
            let now = utc(2024, 3, 10, 6, 0);
            let doc = CalendarDocument::new(vec![
                timed("Focus time", utc(2024, 3, 10, 9, 0), utc(2024, 3, 10, 11, 0)),
                timed("Review", utc(2024, 3, 10, 13, 0), utc(2024, 3, 10, 14, 0)),
            ]);

            let options = one_day_window().with_exclusions(filter(vec!["focus".into()]));
            assert_eq!(titles(&normalize(&doc, &options, now)), vec!["Review"]);
        }

        #[test]
        fn until_hides_then_shows() {
            let start = utc(2024, 3, 10, 12, 0);
            let end = utc(2024, 3, 10, 15, 0);
            let doc = CalendarDocument::new(vec![timed("Deploy window", start, end)]);
            let rule = ExclusionRule::Rule(RuleSpec {
                filter_by: "deploy".to_string(),
                regex: false,
                case_sensitive: false,
                until: Some("2 hours".to_string()),
            });
            let options = one_day_window().with_exclusions(filter(vec![rule]));

            // Hidden while now < end - 2h.
            assert!(normalize(&doc, &options, utc(2024, 3, 10, 12, 59)).is_empty());
            assert_eq!(normalize(&doc, &options, utc(2024, 3, 10, 13, 0)).len(), 1);
        }
    }

    mod recurring {
        use super::*;

        fn weekly() -> RawEventEntry {
            RawEventEntry::event(EntryTime::Utc(utc(2024, 1, 1, 9, 0)))
                .with_uid("weekly-1")
                .with_summary("Planning")
                .with_location("Room 1")
                .with_end(EntryTime::Utc(utc(2024, 1, 1, 10, 0)))
                .with_rrule("FREQ=WEEKLY;BYDAY=MO")
        }

        #[test]
        fn occurrences_in_window() {
            let now = utc(2024, 3, 1, 0, 0);
            let doc = CalendarDocument::new(vec![weekly()]);
            let options = NormalizeOptions::default().with_max_window_days(14);

            let events = normalize(&doc, &options, now);
            let starts: Vec<_> = events.iter().map(|e| e.start_date).collect();
            assert_eq!(
                starts,
                vec![
                    utc(2024, 3, 4, 9, 0).timestamp_millis(),
                    utc(2024, 3, 11, 9, 0).timestamp_millis()
                ]
            );
            assert!(events.iter().all(|e| e.recurring_event && e.first_year == 2024));
        }

        #[test]
        fn override_uses_its_own_times_and_inherits_location() {
            let moved = RawEventEntry::event(EntryTime::Utc(utc(2024, 3, 5, 14, 0)))
                .with_summary("Planning (moved)")
                .with_end(EntryTime::Utc(utc(2024, 3, 5, 15, 30)));
            let doc = CalendarDocument::new(vec![weekly().with_override("2024-03-04", moved)]);
            let options = NormalizeOptions::default().with_max_window_days(7);

            let events = normalize(&doc, &options, utc(2024, 3, 1, 0, 0));
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].title, "Planning (moved)");
            assert_eq!(events[0].start_date, utc(2024, 3, 5, 14, 0).timestamp_millis());
            assert_eq!(events[0].end_date, utc(2024, 3, 5, 15, 30).timestamp_millis());
            assert_eq!(events[0].location.as_deref(), Some("Room 1"));
        }

        #[test]
        fn broken_rule_skips_entry() {
            let doc = CalendarDocument::new(vec![
                weekly().with_rrule("FREQ=NEVER"),
                timed("Other", utc(2024, 3, 2, 9, 0), utc(2024, 3, 2, 10, 0)),
            ]);
            let options = NormalizeOptions::default().with_max_window_days(7);

            assert_eq!(titles(&normalize(&doc, &options, utc(2024, 3, 1, 0, 0))), vec!["Other"]);
        }

        #[test]
        fn first_year_comes_from_the_series() {
            let entry = RawEventEntry::event(EntryTime::Date(date(1990, 6, 15)))
                .with_summary("Anniversary")
                .with_end(EntryTime::Date(date(1990, 6, 16)))
                .with_rrule("FREQ=YEARLY");
            let doc = CalendarDocument::new(vec![entry]);

            let events = normalize(&doc, &NormalizeOptions::default(), utc(2024, 6, 1, 0, 0));
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].first_year, 1990);
            assert!(events[0].full_day_event);
            assert_eq!(events[0].start_date, utc(2024, 6, 15, 0, 0).timestamp_millis());
        }
    }

    mod birthdays {
        use super::*;

        #[test]
        fn not_expanded_and_one_day_long() {
            let local = chrono_tz::Europe::Berlin;
            let entry = RawEventEntry::event(EntryTime::Date(date(2024, 3, 12)))
                .with_uid("b42@facebook.com")
                .with_summary("Ada's birthday")
                .with_rrule("FREQ=YEARLY");
            let doc = CalendarDocument::new(vec![entry]);
            let options = NormalizeOptions::default().with_local_zone(local);

            let events = normalize(&doc, &options, utc(2024, 3, 1, 0, 0));
            assert_eq!(events.len(), 1);
            let birthday = &events[0];
            assert!(birthday.full_day_event);
            assert!(!birthday.recurring_event);
            assert_eq!(birthday.start_date, local_midnight(date(2024, 3, 12), local).timestamp_millis());
            assert_eq!(birthday.end_date, local_midnight(date(2024, 3, 13), local).timestamp_millis());
        }
    }

    #[test]
    fn next_day_crosses_dst() {
        let local = chrono_tz::Europe::Berlin;
        let start = local_midnight(date(2024, 3, 31), local);
        let end = next_day(start, local);
        assert_eq!(end, local_midnight(date(2024, 4, 1), local));
        assert_eq!(end - start, Duration::hours(23));
    }
}
