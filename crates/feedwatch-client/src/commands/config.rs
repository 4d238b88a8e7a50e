//! Configuration commands.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the configuration to stdout with plain-text secrets masked.
pub fn dump(config: &ClientConfig) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(&config.redacted())
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {e}")))?;
    println!("# config.toml ({})", ClientConfig::default_path().display());
    println!("{toml_str}");
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    config.validate()?;
    println!(
        "Configuration is valid: {} calendar(s), {} feed(s), {} chat(s), time zone {}.",
        config.calendars.len(),
        config.feeds.len(),
        config.chats.len(),
        config.local_zone()?
    );
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> ClientResult<()> {
    println!("config: {}", ClientConfig::default_path().display());
    Ok(())
}
