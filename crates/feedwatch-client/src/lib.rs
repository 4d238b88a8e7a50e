//! Command-line client: configuration, secret references and the commands
//! that drive the feedwatch registry.
//!
//! This crate provides the `feedwatch` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
