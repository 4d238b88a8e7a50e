//! Status classification and retry delays.
//!
//! | Status          | Kind          | Delay                                    |
//! |-----------------|---------------|------------------------------------------|
//! | 401, 403        | AUTH_FAILURE  | max(base x 5, 30 min)                    |
//! | 429             | RATE_LIMITED  | `Retry-After` (>= base), else max(base x 2, 15 min) |
//! | >= 500          | SERVER_ERROR  | base x 2^count, count capped at max retries |
//! | other 4xx       | CLIENT_ERROR  | max(base x 2, 15 min)                    |
//! | other non-2xx   | UNKNOWN_ERROR | base                                     |
//! | transport error | NETWORK_ERROR | base                                     |

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{ErrorInfo, ErrorKind};

pub const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);
pub const THIRTY_MINUTES: Duration = Duration::from_secs(30 * 60);

/// Requested delays below this are replaced by the reload interval.
pub const MIN_SCHEDULE_DELAY: Duration = Duration::from_secs(1);

/// Retry state for one source.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    reload_interval: Duration,
    max_retries: u32,
    server_error_count: u32,
}

impl RetryPolicy {
    pub fn new(reload_interval: Duration, max_retries: u32) -> Self {
        Self {
            reload_interval,
            max_retries,
            server_error_count: 0,
        }
    }

    pub fn reload_interval(&self) -> Duration {
        self.reload_interval
    }

    pub fn set_reload_interval(&mut self, interval: Duration) {
        self.reload_interval = interval;
    }

    /// Consecutive 5xx responses since the last success.
    pub fn server_error_count(&self) -> u32 {
        self.server_error_count
    }

    pub fn on_success(&mut self) {
        self.server_error_count = 0;
    }

    /// Classifies a non-2xx status. `retry_after` is the raw header value.
    pub fn on_status(&mut self, status: u16, retry_after: Option<&str>, now: DateTime<Utc>) -> ErrorInfo {
        let base = self.reload_interval;

        let (kind, delay, message) = match status {
            401 | 403 => {
                let delay = base.saturating_mul(5).max(THIRTY_MINUTES);
                let message = format!(
                    "Authentication failed ({status}). Waiting {} minutes before retry.",
                    round_minutes(delay)
                );
                (ErrorKind::AuthFailure, delay, message)
            }
            429 => {
                let delay = match retry_after.and_then(|value| parse_retry_after(value, now)) {
                    Some(parsed) => parsed.max(base),
                    None => base.saturating_mul(2).max(FIFTEEN_MINUTES),
                };
                let message = format!("Rate limited (429). Retrying in {} minutes.", round_minutes(delay));
                (ErrorKind::RateLimited, delay, message)
            }
            500..=u16::MAX => {
                self.server_error_count = (self.server_error_count + 1).min(self.max_retries);
                let delay = 2u32
                    .checked_pow(self.server_error_count)
                    .map_or(Duration::MAX, |factor| base.saturating_mul(factor));
                let message = format!(
                    "Server error ({status}). Retry #{} in {} minutes.",
                    self.server_error_count,
                    round_minutes(delay)
                );
                (ErrorKind::ServerError, delay, message)
            }
            400..=499 => {
                let delay = base.saturating_mul(2).max(FIFTEEN_MINUTES);
                let message = format!("Client error ({status}). Retrying in {} minutes.", round_minutes(delay));
                (ErrorKind::ClientError, delay, message)
            }
            _ => (ErrorKind::UnknownError, base, format!("Unexpected HTTP status {status}.")),
        };

        ErrorInfo::new(kind, message)
            .with_status(status)
            .with_retry_after(delay)
            .with_retry_count(self.server_error_count)
    }

    /// Classifies a transport failure. The counter is left untouched.
    pub fn on_network_error(&self, message: impl Into<String>) -> ErrorInfo {
        ErrorInfo::network(message)
            .with_retry_after(self.reload_interval)
            .with_retry_count(self.server_error_count)
    }

    /// Delay actually armed for a requested delay.
    ///
    /// `None` and anything under [`MIN_SCHEDULE_DELAY`] become the reload
    /// interval.
    pub fn schedule_delay(&self, requested: Option<Duration>) -> Duration {
        match requested {
            Some(delay) if delay >= MIN_SCHEDULE_DELAY => delay,
            _ => self.reload_interval,
        }
    }
}

/// Parses a `Retry-After` value: delta seconds or an HTTP-date.
///
/// Dates in the past yield zero. Returns `None` when neither form parses or
/// the number of seconds does not fit a `Duration`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = date.with_timezone(&Utc) - now;
    Some(remaining.to_std().unwrap_or(Duration::ZERO))
}

fn round_minutes(delay: Duration) -> u64 {
    (delay.as_secs_f64() / 60.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 10, 21, 7, 0, 0).unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(FIVE_MINUTES, 3)
    }

    mod statuses {
        use super::*;

        #[test]
        fn auth_failure_waits_at_least_thirty_minutes() {
            let err = policy().on_status(401, None, now());
            assert_eq!(err.kind(), ErrorKind::AuthFailure);
            assert_eq!(err.retry_after(), THIRTY_MINUTES);
            assert_eq!(err.status(), Some(401));
            assert_eq!(
                err.message(),
                "Authentication failed (401). Waiting 30 minutes before retry."
            );

            let mut slow = RetryPolicy::new(Duration::from_secs(3600), 3);
            assert_eq!(slow.on_status(403, None, now()).retry_after(), Duration::from_secs(5 * 3600));
        }

        #[test]
        fn rate_limited_honors_retry_after_seconds() {
            let err = RetryPolicy::new(Duration::from_secs(60), 3).on_status(429, Some("120"), now());
            assert_eq!(err.kind(), ErrorKind::RateLimited);
            assert_eq!(err.retry_after(), Duration::from_millis(120_000));
            assert_eq!(err.message(), "Rate limited (429). Retrying in 2 minutes.");
        }

        #[test]
        fn rate_limited_retry_after_is_clamped_to_base() {
            let err = policy().on_status(429, Some("10"), now());
            assert_eq!(err.retry_after(), FIVE_MINUTES);
        }

        #[test]
        fn rate_limited_http_date() {
            let err = RetryPolicy::new(Duration::from_secs(60), 3).on_status(
                429,
                Some("Wed, 21 Oct 2015 07:28:00 GMT"),
                now(),
            );
            assert_eq!(err.retry_after(), Duration::from_secs(28 * 60));
        }

        #[test]
        fn rate_limited_without_header() {
            let err = policy().on_status(429, None, now());
            assert_eq!(err.retry_after(), FIFTEEN_MINUTES);

            let err = policy().on_status(429, Some("whenever"), now());
            assert_eq!(err.retry_after(), FIFTEEN_MINUTES);
        }

        #[test]
        fn client_error() {
            let err = policy().on_status(404, None, now());
            assert_eq!(err.kind(), ErrorKind::ClientError);
            assert_eq!(err.retry_after(), FIFTEEN_MINUTES);
            assert_eq!(err.message(), "Client error (404). Retrying in 15 minutes.");

            let mut hourly = RetryPolicy::new(Duration::from_secs(3600), 3);
            assert_eq!(hourly.on_status(410, None, now()).retry_after(), Duration::from_secs(7200));
        }

        #[test]
        fn unexpected_status_uses_base() {
            let err = policy().on_status(304, None, now());
            assert_eq!(err.kind(), ErrorKind::UnknownError);
            assert_eq!(err.retry_after(), FIVE_MINUTES);
            assert_eq!(err.message(), "Unexpected HTTP status 304.");
        }

        #[test]
        fn network_error_uses_base() {
            let err = policy().on_network_error("Network error: connection refused");
            assert_eq!(err.kind(), ErrorKind::NetworkError);
            assert_eq!(err.retry_after(), FIVE_MINUTES);
            assert_eq!(err.status(), None);
        }
    }

    mod backoff {
        use super::*;

        #[test]
        fn doubles_per_server_error_up_to_cap() {
            let mut policy = policy();
            let delays: Vec<_> = (0..5)
                .map(|_| policy.on_status(503, None, now()).retry_after())
                .collect();
            assert_eq!(
                delays,
                vec![
                    FIVE_MINUTES * 2,
                    FIVE_MINUTES * 4,
                    FIVE_MINUTES * 8,
                    FIVE_MINUTES * 8,
                    FIVE_MINUTES * 8,
                ]
            );
            assert_eq!(policy.server_error_count(), 3);
        }

        #[test]
        fn success_resets_counter() {
            let mut policy = policy();
            policy.on_status(500, None, now());
            policy.on_status(502, None, now());
            policy.on_success();
            assert_eq!(policy.server_error_count(), 0);

            let err = policy.on_status(500, None, now());
            assert_eq!(err.retry_count(), 1);
            assert_eq!(err.retry_after(), FIVE_MINUTES * 2);
            assert_eq!(err.message(), "Server error (500). Retry #1 in 10 minutes.");
        }

        #[test]
        fn other_errors_leave_counter_alone() {
            let mut policy = policy();
            policy.on_status(500, None, now());
            policy.on_status(404, None, now());
            let err = policy.on_network_error("Network error: reset");
            assert_eq!(err.retry_count(), 1);
        }
    }

    mod schedule {
        use super::*;

        #[test]
        fn short_delays_clamp_to_reload_interval() {
            let policy = policy();
            assert_eq!(policy.schedule_delay(None), FIVE_MINUTES);
            assert_eq!(policy.schedule_delay(Some(Duration::from_millis(999))), FIVE_MINUTES);
            assert_eq!(policy.schedule_delay(Some(Duration::ZERO)), FIVE_MINUTES);
            assert_eq!(
                policy.schedule_delay(Some(Duration::from_secs(1))),
                Duration::from_secs(1)
            );
            assert_eq!(policy.schedule_delay(Some(THIRTY_MINUTES)), THIRTY_MINUTES);
        }
    }

    mod retry_after_header {
        use super::*;

        #[test]
        fn seconds() {
            assert_eq!(parse_retry_after("0", now()), Some(Duration::ZERO));
            assert_eq!(parse_retry_after(" 30 ", now()), Some(Duration::from_secs(30)));
            assert_eq!(parse_retry_after("1.5", now()), Some(Duration::from_millis(1500)));
            assert_eq!(parse_retry_after("-5", now()), None);
        }

        #[test]
        fn past_date_is_zero() {
            assert_eq!(
                parse_retry_after("Tue, 20 Oct 2015 07:28:00 GMT", now()),
                Some(Duration::ZERO)
            );
        }

        #[test]
        fn garbage() {
            assert_eq!(parse_retry_after("soon", now()), None);
            assert_eq!(parse_retry_after("", now()), None);
            assert_eq!(parse_retry_after("NaN", now()), None);
            assert_eq!(parse_retry_after("inf", now()), None);
        }

        #[test]
        fn out_of_range_seconds() {
            assert_eq!(parse_retry_after("1e20", now()), None);
            assert_eq!(
                parse_retry_after("1e19", now()),
                Some(Duration::from_secs(10_000_000_000_000_000_000))
            );
        }

        #[test]
        fn overflowing_value_falls_back_to_default() {
            let err = policy().on_status(429, Some("1e20"), now());
            assert_eq!(err.kind(), ErrorKind::RateLimited);
            assert_eq!(err.retry_after(), FIFTEEN_MINUTES);

            let err = policy().on_status(429, Some("1e19"), now());
            assert_eq!(err.retry_after(), Duration::from_secs(10_000_000_000_000_000_000));
            assert_eq!(err.report().retry_after_ms, u64::MAX);
        }
    }
}
