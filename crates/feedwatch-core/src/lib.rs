//! Core types: display events, date keys, time windows, exclusion filters

pub mod event;
pub mod filter;
pub mod time;
pub mod tracing;

pub use event::{DisplayEvent, Geo};
pub use filter::{
    CompiledRule, Exclusion, ExclusionFilter, ExclusionRule, FilterError, Matcher, RuleSpec,
};
pub use time::{
    OffsetParseError, OffsetUnit, RelativeOffset, TimeWindow, date_key, end_of_day,
    local_midnight, resolve_local, saturating_add, start_of_day,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
