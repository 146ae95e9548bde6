//! Structured logging setup.
//!
//! Libraries in this workspace only emit `tracing` events; binaries call
//! [`init`] once at startup to print them.

#![warn(missing_docs, clippy::pedantic)]

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Level used when neither `RUST_LOG` nor the caller picks one.
pub const DEFAULT_LEVEL: &str = "info";

/// Builds the event filter: `RUST_LOG` when set, else `default_directive`.
///
/// # Errors
///
/// Fails if `default_directive` is not a valid filter directive.
pub fn filter(default_directive: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|err| anyhow!("invalid log filter `{default_directive}`: {err}")),
    }
}

/// Installs a `fmt` subscriber writing to stderr.
///
/// # Errors
///
/// Fails if the filter is invalid or a global subscriber is already set.
pub fn init(default_directive: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_directive)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_once() {
        init("toolplan_tools=debug,warn").unwrap();
        assert!(init(DEFAULT_LEVEL).is_err());
    }
}
