//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use feedwatch_core::TracingOutputFormat;

/// feedwatch - calendars, news feeds and chats polled into one stream
#[derive(Debug, Parser)]
#[command(name = "feedwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FEEDWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long)]
    pub log_format: Option<TracingOutputFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll every configured source and print notifications until interrupted
    Run {
        /// Pretty-print each notification instead of one JSON line
        #[arg(long)]
        pretty: bool,
    },

    /// Fetch every source once, print the notifications and exit
    Once {
        /// Give up waiting after this many seconds
        #[arg(long, default_value = "60")]
        timeout: u64,

        /// Pretty-print each notification instead of one JSON line
        #[arg(long)]
        pretty: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration, secrets masked
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
