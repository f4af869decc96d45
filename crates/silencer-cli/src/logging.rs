//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over `--log-level` when it is set. Logs go to stderr in
//! either text or JSON form.

use std::io;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::LogFormat;
use crate::error::CliError;

/// Builds the filter from an optional `RUST_LOG` value and the configured level.
///
/// # Errors
///
/// Returns `CliError::LogFilter` if the chosen directive does not parse.
pub fn build_filter(env: Option<&str>, level: &str) -> Result<EnvFilter, CliError> {
    let directive = env.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(level);
    EnvFilter::try_new(directive).map_err(|e| CliError::LogFilter {
        filter: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error for a bad filter or if a subscriber is already installed.
pub fn init(format: LogFormat, level: &str) -> Result<(), CliError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(env.as_deref(), level)?;

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr))
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(io::stderr))
            .with(filter)
            .try_init(),
    }
    .map_err(|e| CliError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(None, "info", "info" ; "level only")]
    #[test_case(Some("debug"), "info", "debug" ; "env wins")]
    #[test_case(Some("  "), "warn", "warn" ; "blank env ignored")]
    fn picks_directive(env: Option<&str>, level: &str, want: &str) {
        let filter = build_filter(env, level).unwrap();
        assert_eq!(filter.to_string(), want);
    }

    #[test]
    fn rejects_bad_level() {
        let err = build_filter(None, "silencer_core=loud").unwrap_err();
        assert!(matches!(err, CliError::LogFilter { .. }));
    }
}
