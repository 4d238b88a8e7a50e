//! ICS calendars.
//!
//! [`parse_ics`] builds a [`CalendarDocument`] of raw entries, with
//! `RECURRENCE-ID` overrides and `EXDATE`s attached to their series.
//! [`normalize`] turns that document into windowed, sorted
//! [`DisplayEvent`](feedwatch_core::DisplayEvent)s, calling [`expand`] for
//! recurring entries. [`CalendarFeed`] glues both to a polled transport.

mod entry;
mod feed;
mod ics;
mod normalize;
mod recurrence;

pub use entry::{CalendarDocument, DEFAULT_TITLE, EntryKind, EntryTime, RawEventEntry};
pub use feed::CalendarFeed;
pub use ics::{IcsError, parse_duration, parse_ics, parse_ics_datetime};
pub use normalize::{DEFAULT_MAX_ENTRIES, DEFAULT_MAX_WINDOW_DAYS, NormalizeOptions, normalize};
pub use recurrence::{ExpandedInstance, RecurrenceError, expand};
