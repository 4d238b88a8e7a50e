//! Calendar feed: fetch an ICS document and normalize it.

use std::time::Duration;

use chrono::Utc;
use feedwatch_core::DisplayEvent;
use tracing::{debug, error};

use crate::error::FeedResult;
use crate::feed::{BoxFuture, Feed, FeedUpdate};
use crate::http::{SourceConfig, Transport};

use super::ics::parse_ics;
use super::normalize::{NormalizeOptions, normalize};

/// A polled ICS calendar.
#[derive(Debug)]
pub struct CalendarFeed {
    transport: Transport,
    options: NormalizeOptions,
}

impl CalendarFeed {
    pub fn new(config: SourceConfig, options: NormalizeOptions) -> FeedResult<Self> {
        Ok(Self {
            transport: Transport::new(config)?,
            options,
        })
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Parses and normalizes a fetched document body.
    fn events_from(&self, body: &str) -> FeedResult<Vec<DisplayEvent>> {
        let document = parse_ics(body, self.options.local_zone).map_err(|e| {
            let err = self.transport.parse_error(format!("iCal parsing failed: {e}"));
            error!(url = self.transport.identity(), "{}", err.message());
            err.with_source(e)
        })?;

        let events = normalize(&document, &self.options, Utc::now());
        debug!(
            url = self.transport.identity(),
            entries = document.len(),
            events = events.len(),
            "Calendar normalized"
        );
        Ok(events)
    }
}

impl Feed for CalendarFeed {
    type Item = DisplayEvent;

    fn url(&self) -> &str {
        self.transport.identity()
    }

    fn reload_interval(&self) -> Duration {
        self.transport.reload_interval()
    }

    fn poll(&mut self) -> BoxFuture<'_, FeedUpdate<DisplayEvent>> {
        Box::pin(async move {
            let attempt = self.transport.fetch().await;
            let result = match attempt.outcome {
                Ok(response) => match response.text().await {
                    Ok(body) => self.events_from(&body),
                    Err(e) => Err(self.transport.body_error(e)),
                },
                Err(err) => Err(err),
            };
            FeedUpdate::new(result, attempt.next_delay)
        })
    }
}
