//! feedwatch CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use feedwatch_core::{TracingConfig, init_tracing};

use feedwatch_client::cli::{Cli, Command, ConfigAction};
use feedwatch_client::commands;
use feedwatch_client::config::ClientConfig;
use feedwatch_client::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::watcher()
    };
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    if let Err(e) = init_tracing(logging) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };

    match cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
        Some(Command::Once { timeout, pretty }) => {
            commands::run::once(&config, Duration::from_secs(timeout), pretty).await
        }
        Some(Command::Run { pretty }) => commands::run::run(&config, pretty).await,
        None => commands::run::run(&config, false).await,
    }
}
