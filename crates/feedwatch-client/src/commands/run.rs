//! `run` and `once`: register every configured source and print what the
//! registry broadcasts.
//!
//! Notifications go to stdout as JSON, one per line unless `--pretty`; logs
//! go to stderr.

use std::io::Write;
use std::time::Duration;

use feedwatch_server::{Notification, Registry};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Writes one notification.
pub fn print_notification(
    out: &mut impl Write,
    notification: &Notification,
    pretty: bool,
) -> ClientResult<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, notification)?;
    } else {
        serde_json::to_writer(&mut *out, notification)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Builds the registry and registers every source. A source that cannot be
/// registered is logged and skipped.
async fn start(
    config: &ClientConfig,
    background_timers: bool,
) -> ClientResult<(Registry, broadcast::Receiver<Notification>)> {
    if config.source_count() == 0 {
        return Err(ClientError::Config(format!(
            "no sources configured; add [[calendars]], [[feeds]] or [[chats]] to {}",
            ClientConfig::default_path().display()
        )));
    }

    let zone = config.local_zone()?;
    let mut registry = Registry::new(config.server_config(background_timers));
    let rx = registry.subscribe();

    for calendar in &config.calendars {
        let registered = match calendar.to_source(zone) {
            Ok(source) => registry.add_calendar(source).await.map_err(ClientError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = registered {
            error!(id = %calendar.id, "Skipping calendar: {e}");
        }
    }
    for feed in &config.feeds {
        let registered = match feed.to_source() {
            Ok(source) => registry.add_news(source).await.map_err(ClientError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = registered {
            error!(url = %feed.url, "Skipping feed: {e}");
        }
    }
    for chat in &config.chats {
        let registered = match chat.to_options() {
            Ok(options) => registry.add_chat(options).await.map_err(ClientError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = registered {
            error!(chat_id = %chat.chat_id, "Skipping chat: {e}");
        }
    }

    if registry.is_empty() {
        return Err(ClientError::Config(
            "none of the configured sources could be started".into(),
        ));
    }
    info!(
        sources = registry.len(),
        zone = %zone,
        "Sources started"
    );
    Ok((registry, rx))
}

/// Polls until Ctrl-C.
pub async fn run(config: &ClientConfig, pretty: bool) -> ClientResult<()> {
    let (registry, mut rx) = start(config, true).await?;
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Cannot listen for Ctrl-C: {e}");
                }
                info!("Interrupted, shutting down");
                break;
            }
            received = rx.recv() => match received {
                Ok(notification) => print_notification(&mut stdout, &notification, pretty)?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output too slow, notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}

/// Fetches every source once, prints the results and returns.
pub async fn once(config: &ClientConfig, timeout: Duration, pretty: bool) -> ClientResult<()> {
    let (registry, mut rx) = start(config, false).await?;
    let mut stdout = std::io::stdout();

    {
        let settled = registry.settled();
        tokio::pin!(settled);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(notification) => print_notification(&mut stdout, &notification, pretty)?,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Output too slow, notifications dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                () = &mut settled => break,
                () = &mut deadline => {
                    warn!(timeout_secs = timeout.as_secs(), "Gave up waiting for sources");
                    break;
                }
            }
        }
    }

    // Whatever was sent before the last source settled.
    while let Ok(notification) = rx.try_recv() {
        print_notification(&mut stdout, &notification, pretty)?;
    }

    registry.shutdown().await;
    Ok(())
}
