//! Source registry for feedwatch.
//!
//! This crate runs the registered sources and tells consumers about them:
//! - one task per source, fetching on a single re-armed timer
//! - the last good item list per source, replaced atomically
//! - notifications with checksums on a broadcast channel
//!
//! # Example
//!
//! ```rust,no_run
//! use feedwatch_server::{CalendarSource, Registry, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = Registry::new(ServerConfig::default());
//!     let mut notifications = registry.subscribe();
//!     registry
//!         .add_calendar(CalendarSource::new("home", "https://example.com/cal.ics"))
//!         .await?;
//!
//!     while let Ok(notification) = notifications.recv().await {
//!         println!("{}", serde_json::to_string(&notification)?);
//!     }
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod error;
mod notify;
mod registry;
mod scheduler;

pub use cache::{CacheEntry, SourceCache, checksum};
pub use config::{
    CalendarSource, DEFAULT_RELOAD_INTERVAL, MIN_CALENDAR_INTERVAL, NewsSource, ServerConfig,
};
pub use error::{ServerError, ServerResult};
pub use notify::{Notification, Notifier};
pub use registry::Registry;
pub use scheduler::{Publisher, Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle};
