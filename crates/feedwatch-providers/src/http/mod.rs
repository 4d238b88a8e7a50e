//! Polling HTTP transport.
//!
//! [`Transport`] owns one remote source: it performs a single GET at a time,
//! classifies failures with [`RetryPolicy`], and reports the delay before the
//! next attempt. Arming the timer is left to the caller, which keeps the
//! transport free of any runtime assumptions beyond `reqwest`.

mod auth;
mod config;
mod retry;
mod transport;

pub use auth::{Auth, basic_auth};
pub use config::SourceConfig;
pub use retry::{FIFTEEN_MINUTES, MIN_SCHEDULE_DELAY, RetryPolicy, THIRTY_MINUTES, parse_retry_after};
pub use transport::{Attempt, Transport};
