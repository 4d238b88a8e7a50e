//! Secret references in configuration values.
//!
//! Tokens and passwords in `config.toml` may point elsewhere instead of
//! holding the secret itself:
//!
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - `pass::path/in/store` takes the first line of `pass show path/in/store`
//! - anything else is used as written

use std::process::Command;

use crate::error::{ClientError, ClientResult};

/// Resolves `value`, following a secret reference if it has one.
pub fn resolve(value: &str) -> ClientResult<String> {
    if let Some(var) = value.strip_prefix("env::") {
        return std::env::var(var)
            .map_err(|_| ClientError::Secret(format!("environment variable `{var}` is not set")));
    }
    if let Some(entry) = value.strip_prefix("pass::") {
        return from_pass(entry);
    }
    Ok(value.to_string())
}

/// True when `value` is a reference rather than the secret itself.
pub fn is_reference(value: &str) -> bool {
    value.starts_with("env::") || value.starts_with("pass::")
}

fn from_pass(entry: &str) -> ClientResult<String> {
    let output = Command::new("pass")
        .args(["show", entry])
        .output()
        .map_err(|e| ClientError::Secret(format!("cannot run `pass show {entry}`: {e}")))?;

    if !output.status.success() {
        return Err(ClientError::Secret(format!(
            "`pass show {entry}` exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ClientError::Secret(format!("`pass show {entry}` printed nothing")))
}
